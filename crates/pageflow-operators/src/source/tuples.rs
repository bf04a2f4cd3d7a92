use pageflow_core::error::{Error, Result};
use pageflow_core::schema::Schema;
use pageflow_core::types::{ElementType, Value};
use pageflow_data::{Block, BlockFactory, Builder, Page};

use super::{row_at, BlockSourceOperator, SourceRows};

/// Rows of nullable values over a declared column type list.
#[derive(Debug, Clone)]
pub struct TupleRows {
    types: Vec<ElementType>,
    rows: Vec<Vec<Option<Value>>>,
}

impl TupleRows {
    /// Every row must have exactly one entry per declared column.
    pub fn new(types: Vec<ElementType>, rows: Vec<Vec<Option<Value>>>) -> Result<Self> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != types.len())
        {
            return Err(Error::IllegalState(format!(
                "row {index} has {} values, expected {}",
                row.len(),
                types.len()
            )));
        }
        Ok(Self { types, rows })
    }

    pub fn types(&self) -> &[ElementType] {
        &self.types
    }
}

impl SourceRows for TupleRows {
    fn name(&self) -> &'static str {
        "tuple_source"
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn create_page(&self, factory: &BlockFactory, offset: usize, length: usize) -> Result<Page> {
        if self.types.is_empty() {
            row_at(&self.rows, (offset + length).saturating_sub(1))?;
            return Ok(Page::with_position_count(length));
        }
        let mut builders = self
            .types
            .iter()
            .map(|&t| factory.new_block_builder(t, length))
            .collect::<Result<Vec<Builder>>>()?;
        for i in 0..length {
            let row = row_at(&self.rows, offset + i)?;
            for (builder, value) in builders.iter_mut().zip(row) {
                builder.append_option(value.clone())?;
            }
        }
        let blocks = builders
            .into_iter()
            .map(Builder::build)
            .collect::<Result<Vec<Block>>>()?;
        Page::new(blocks)
    }
}

/// Source over arbitrary typed rows, one block per declared column.
pub type TupleSourceOperator = BlockSourceOperator<TupleRows>;

impl BlockSourceOperator<TupleRows> {
    pub fn new(
        factory: BlockFactory,
        types: Vec<ElementType>,
        rows: Vec<Vec<Option<Value>>>,
    ) -> Result<Self> {
        Ok(Self::with_default_page_size(
            factory,
            TupleRows::new(types, rows)?,
        ))
    }

    /// Column types taken from `schema`, in field order. A null in a field
    /// declared non-nullable is `IllegalState`.
    pub fn with_schema(
        factory: BlockFactory,
        schema: &Schema,
        rows: Vec<Vec<Option<Value>>>,
        max_page_positions: usize,
    ) -> Result<Self> {
        let rows = TupleRows::new(schema.element_types(), rows)?;
        for (index, row) in rows.rows.iter().enumerate() {
            let null_field = schema
                .fields
                .iter()
                .zip(row)
                .find(|(field, value)| !field.nullable && value.is_none());
            if let Some((field, _)) = null_field {
                return Err(Error::IllegalState(format!(
                    "row {index} has a null in non-nullable field '{}'",
                    field.name
                )));
            }
        }
        Self::from_rows(factory, rows, max_page_positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Operator;
    use pageflow_core::schema::Field;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", ElementType::Int, false),
            Field::new("name", ElementType::Bytes, true),
            Field::new("ok", ElementType::Boolean, true),
        ])
    }

    #[test]
    fn builds_one_block_per_declared_column() {
        let factory = BlockFactory::with_limit(1 << 20);
        let rows = vec![
            vec![Some(Value::Int(1)), Some("a".into()), Some(Value::Boolean(true))],
            vec![Some(Value::Int(2)), None, None],
            vec![Some(Value::Int(3)), Some("ccc".into()), Some(Value::Boolean(false))],
        ];
        let mut source =
            TupleSourceOperator::with_schema(factory.clone(), &schema(), rows, 2).unwrap();

        let page = source.get_output().unwrap().unwrap();
        assert_eq!(page.block_count(), 3);
        assert_eq!(page.block(1).unwrap().element_type(), ElementType::Bytes);
        assert_eq!(page.get_value(1, 0), Some(Value::Bytes(b"a".to_vec())));
        assert_eq!(page.get_value(1, 1), None);
        assert_eq!(page.get_value(2, 1), None);

        let page = source.get_output().unwrap().unwrap();
        assert_eq!(page.position_count(), 1);
        assert_eq!(page.get_value(0, 0), Some(Value::Int(3)));
        assert!(source.is_finished());
    }

    #[test]
    fn arity_mismatch_is_illegal_state() {
        let err = TupleSourceOperator::new(
            BlockFactory::unlimited(),
            vec![ElementType::Long, ElementType::Double],
            vec![vec![Some(Value::Long(1))]],
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::IllegalState(_)));
    }

    #[test]
    fn null_in_non_nullable_field_is_rejected() {
        let factory = BlockFactory::with_limit(1 << 20);
        let rows = vec![
            vec![Some(Value::Int(1)), None, None],
            vec![None, Some("b".into()), Some(Value::Boolean(true))],
        ];
        let err = TupleSourceOperator::with_schema(factory.clone(), &schema(), rows, 8)
            .err()
            .unwrap();
        assert_eq!(
            err,
            Error::IllegalState("row 1 has a null in non-nullable field 'id'".into())
        );
        assert_eq!(factory.peak_bytes(), 0);
    }

    #[test]
    fn wrong_value_type_is_type_mismatch_and_leaks_nothing() {
        let factory = BlockFactory::with_limit(1 << 20);
        let mut source = TupleSourceOperator::new(
            factory.clone(),
            vec![ElementType::Long],
            vec![vec![Some(Value::Long(1))], vec![Some(Value::Double(2.0))]],
        )
        .unwrap();
        let err = source.get_output().unwrap_err();
        assert_eq!(
            err,
            Error::TypeMismatch {
                expected: ElementType::Long,
                actual: ElementType::Double,
            }
        );
        source.close();
        assert_eq!(factory.used_bytes(), 0);
    }

    #[test]
    fn int_values_widen_into_long_columns() {
        let mut source = TupleSourceOperator::new(
            BlockFactory::unlimited(),
            vec![ElementType::Long],
            vec![vec![Some(Value::Int(7))]],
        )
        .unwrap();
        let page = source.get_output().unwrap().unwrap();
        assert_eq!(page.get_value(0, 0), Some(Value::Long(7)));
    }

    #[test]
    fn zero_column_rows_still_count_positions() {
        let mut source =
            TupleSourceOperator::new(BlockFactory::unlimited(), vec![], vec![vec![], vec![]])
                .unwrap();
        let page = source.get_output().unwrap().unwrap();
        assert_eq!(page.position_count(), 2);
        assert_eq!(page.block_count(), 0);
    }
}
