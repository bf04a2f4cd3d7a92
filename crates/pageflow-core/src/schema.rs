//! Logical schema of a Page: one field per channel. Pure data.

use serde::{Deserialize, Serialize};

use crate::types::ElementType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub element_type: ElementType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, element_type: ElementType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            element_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn field(&self, channel: usize) -> Option<&Field> {
        self.fields.get(channel)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn element_types(&self) -> Vec<ElementType> {
        self.fields.iter().map(|f| f.element_type).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
