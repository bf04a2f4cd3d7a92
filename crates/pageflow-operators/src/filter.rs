//! Filter operator with simple predicate evaluation.
//!
//! Supports predicates of the form `field OP literal` where OP is one of
//! `==`, `!=`, `<`, `<=`, `>`, `>=`. Null positions never match; a
//! multi-valued position matches when any of its values does.

use std::cmp::Ordering;
use std::fmt;

use pageflow_core::error::{Error, Result};
use pageflow_core::schema::Schema;
use pageflow_core::types::Value;
use pageflow_data::{Block, BlockFactory, Page};

use crate::traits::{Operator, Pipe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    // two-character operators first so `<=` is not read as `<`
    const SYMBOLS: [(&'static str, CompareOp); 6] = [
        ("==", CompareOp::Eq),
        ("!=", CompareOp::Ne),
        ("<=", CompareOp::Le),
        (">=", CompareOp::Ge),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

/// `channel <op> literal`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub channel: usize,
    pub op: CompareOp,
    pub literal: Value,
}

impl Predicate {
    pub fn new(channel: usize, op: CompareOp, literal: impl Into<Value>) -> Self {
        Self {
            channel,
            op,
            literal: literal.into(),
        }
    }

    /// Parse `"age > 18"`: the field is resolved against `schema` and the
    /// literal is read as that field's element type.
    pub fn parse(expr: &str, schema: &Schema) -> Result<Self> {
        let (field, op, literal) = CompareOp::SYMBOLS
            .iter()
            .find_map(|(symbol, op)| {
                expr.find(symbol)
                    .map(|pos| (&expr[..pos], *op, &expr[pos + symbol.len()..]))
            })
            .ok_or_else(|| Error::Config(format!("unparseable predicate: {expr}")))?;

        let field = field.trim();
        let channel = schema
            .index_of(field)
            .ok_or_else(|| Error::Config(format!("field '{field}' not found")))?;
        let element_type = schema.element_types()[channel];
        Ok(Self {
            channel,
            op,
            literal: Value::parse_as(literal, element_type)?,
        })
    }

    /// Does `position` of `block` satisfy the predicate?
    pub fn matches(&self, block: &Block, position: usize) -> Result<bool> {
        if block.is_null(position) {
            return Ok(false);
        }
        if !block.may_have_multivalued() {
            return match block.get_value(position) {
                Some(v) => Ok(self.op.holds(v.compare(&self.literal)?)),
                None => Ok(false),
            };
        }
        for v in block.get_values(position) {
            if self.op.holds(v.compare(&self.literal)?) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${} {} {:?}", self.channel, self.op.symbol(), self.literal)
    }
}

pub struct FilterOperator {
    factory: BlockFactory,
    predicate: Predicate,
    pipe: Pipe,
    rows_in: u64,
    rows_out: u64,
}

impl FilterOperator {
    pub fn new(factory: BlockFactory, predicate: Predicate) -> Self {
        Self {
            factory,
            predicate,
            pipe: Pipe::new("filter"),
            rows_in: 0,
            rows_out: 0,
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    fn select(&self, page: &Page) -> Result<Vec<usize>> {
        let block = page.block(self.predicate.channel).ok_or(Error::IndexOutOfRange {
            index: self.predicate.channel,
            len: page.block_count(),
        })?;
        let mut keep = Vec::with_capacity(page.position_count());
        for p in 0..page.position_count() {
            if self.predicate.matches(block, p)? {
                keep.push(p);
            }
        }
        Ok(keep)
    }
}

impl Operator for FilterOperator {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn needs_input(&self) -> bool {
        self.pipe.needs_input()
    }

    fn add_input(&mut self, page: Page) -> Result<()> {
        self.pipe.check_accepting()?;
        if page.is_empty() {
            return Ok(());
        }
        let keep = self.select(&page)?;
        self.rows_in += page.position_count() as u64;
        self.rows_out += keep.len() as u64;

        let out = if keep.len() == page.position_count() {
            page
        } else {
            page.filter(&self.factory, &keep)?
        };
        self.pipe.push_output(out);
        Ok(())
    }

    fn finish(&mut self) {
        self.pipe.finish();
    }

    fn is_finished(&self) -> bool {
        self.pipe.is_finished()
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        self.pipe.take_output()
    }

    fn close(&mut self) {
        if !self.pipe.is_closed() {
            tracing::debug!(
                predicate = %self.predicate,
                rows_in = self.rows_in,
                rows_out = self.rows_out,
                "filter closed"
            );
        }
        self.pipe.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageflow_core::schema::Field;
    use pageflow_core::types::ElementType;

    fn page(factory: &BlockFactory, values: &[Option<i64>]) -> Page {
        let mut b = factory.new_long_block_builder(values.len()).unwrap();
        for v in values {
            match v {
                Some(v) => b.append(*v).unwrap(),
                None => b.append_null().unwrap(),
            };
        }
        Page::new(vec![b.build().unwrap().into()]).unwrap()
    }

    #[test]
    fn parses_field_op_literal() {
        let schema = Schema::new(vec![
            Field::new("id", ElementType::Long, false),
            Field::new("score", ElementType::Double, true),
        ]);
        let p = Predicate::parse("score >= 2.5", &schema).unwrap();
        assert_eq!(p, Predicate::new(1, CompareOp::Ge, 2.5));
        let p = Predicate::parse(" id!=3", &schema).unwrap();
        assert_eq!(p, Predicate::new(0, CompareOp::Ne, 3i64));

        assert!(matches!(
            Predicate::parse("missing > 1", &schema),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Predicate::parse("id ~ 1", &schema),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Predicate::parse("id > abc", &schema),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn keeps_matching_positions_and_drops_nulls() {
        let factory = BlockFactory::with_limit(1 << 20);
        // int literal against a long column widens
        let mut filter = FilterOperator::new(factory.clone(), Predicate::new(0, CompareOp::Gt, 1i32));
        filter
            .add_input(page(&factory, &[Some(1), None, Some(3), Some(2)]))
            .unwrap();
        let out = filter.get_output().unwrap().unwrap();
        assert_eq!(out.position_count(), 2);
        assert_eq!(out.get_value(0, 0), Some(Value::Long(3)));
        assert_eq!(out.get_value(0, 1), Some(Value::Long(2)));

        filter.finish();
        assert!(filter.is_finished());
        drop(out);
        filter.close();
        assert_eq!(factory.used_bytes(), 0);
    }

    #[test]
    fn fully_filtered_pages_produce_no_output() {
        let factory = BlockFactory::unlimited();
        let mut filter = FilterOperator::new(factory.clone(), Predicate::new(0, CompareOp::Eq, 9i64));
        filter.add_input(page(&factory, &[Some(1), None])).unwrap();
        assert!(filter.needs_input());
        assert_eq!(filter.get_output().unwrap().map(|p| p.position_count()), None);
    }

    #[test]
    fn multi_valued_position_matches_on_any_value() {
        let factory = BlockFactory::unlimited();
        let mut b = factory.new_long_block_builder(4).unwrap();
        b.begin_position_entry().unwrap();
        b.append(1).unwrap().append(10).unwrap();
        b.end_position_entry().unwrap();
        b.append(2).unwrap();
        let block: Block = b.build().unwrap().into();

        let pred = Predicate::new(0, CompareOp::Ge, 5i64);
        assert!(pred.matches(&block, 0).unwrap());
        assert!(!pred.matches(&block, 1).unwrap());
    }

    #[test]
    fn incompatible_literal_is_type_mismatch() {
        let factory = BlockFactory::unlimited();
        let mut filter = FilterOperator::new(factory.clone(), Predicate::new(0, CompareOp::Eq, true));
        let err = filter.add_input(page(&factory, &[Some(1)])).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }
}
