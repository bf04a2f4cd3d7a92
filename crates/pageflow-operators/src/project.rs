use pageflow_core::error::Result;
use pageflow_data::Page;

use crate::traits::{Operator, Pipe};

/// Selects and reorders channels. Output blocks are shared with the input,
/// so projection never allocates block storage.
pub struct ProjectOperator {
    channels: Vec<usize>,
    pipe: Pipe,
}

impl ProjectOperator {
    pub fn new(channels: Vec<usize>) -> Self {
        Self {
            channels,
            pipe: Pipe::new("project"),
        }
    }

    pub fn channels(&self) -> &[usize] {
        &self.channels
    }
}

impl Operator for ProjectOperator {
    fn name(&self) -> &'static str {
        "project"
    }

    fn needs_input(&self) -> bool {
        self.pipe.needs_input()
    }

    fn add_input(&mut self, page: Page) -> Result<()> {
        self.pipe.check_accepting()?;
        let projected = page.project(&self.channels)?;
        page.release();
        self.pipe.push_output(projected);
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
        self.pipe.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageflow_core::error::Error;
    use pageflow_core::types::Value;
    use pageflow_data::BlockFactory;

    #[test]
    fn reorders_channels_and_drops_unselected_blocks() {
        let factory = BlockFactory::with_limit(1 << 20);
        let a = factory.new_constant_block(&Value::Long(1), 4).unwrap();
        let b = factory.new_constant_block(&Value::Double(2.0), 4).unwrap();
        let page = Page::new(vec![a, b]).unwrap();
        let kept = page.block(1).unwrap().ram_bytes_used();

        let mut project = ProjectOperator::new(vec![1]);
        project.add_input(page).unwrap();
        // the unselected long block was released
        assert_eq!(factory.used_bytes(), kept);

        let out = project.get_output().unwrap().unwrap();
        assert_eq!(out.block_count(), 1);
        assert_eq!(out.get_value(0, 3), Some(Value::Double(2.0)));
        drop(out);
        assert_eq!(factory.used_bytes(), 0);
    }

    #[test]
    fn bad_channel_is_index_out_of_range() {
        let mut project = ProjectOperator::new(vec![3]);
        let err = project
            .add_input(Page::with_position_count(2))
            .unwrap_err();
        assert_eq!(err, Error::IndexOutOfRange { index: 3, len: 0 });
        project.close();
        project.close();
        assert!(project.is_finished());
    }
}
