//! Terminal operators. A sink accepts pages until `finish` and never emits.

use std::sync::{Arc, Mutex, MutexGuard};

use pageflow_core::error::{Error, Result};
use pageflow_data::Page;

use crate::traits::Operator;

/// Shared handle to the pages a `PageCollectorSink` received.
#[derive(Debug, Clone, Default)]
pub struct CollectedPages {
    pages: Arc<Mutex<Vec<Page>>>,
}

impl CollectedPages {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Page>> {
        // a poisoned lock still guards a consistent Vec
        self.pages.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, page: Page) {
        self.lock().push(page);
    }

    pub fn page_count(&self) -> usize {
        self.lock().len()
    }

    pub fn position_count(&self) -> usize {
        self.lock().iter().map(Page::position_count).sum()
    }

    /// Take every collected page, leaving the handle empty.
    pub fn take(&self) -> Vec<Page> {
        std::mem::take(&mut *self.lock())
    }

    /// Drop all collected pages, returning their memory.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Accepting,
    Finished,
    Closed,
}

/// Stores every page it receives into a `CollectedPages` handle.
pub struct PageCollectorSink {
    pages: CollectedPages,
    state: SinkState,
}

impl PageCollectorSink {
    pub fn new(pages: CollectedPages) -> Self {
        Self {
            pages,
            state: SinkState::Accepting,
        }
    }

    pub fn pages(&self) -> &CollectedPages {
        &self.pages
    }
}

impl Operator for PageCollectorSink {
    fn name(&self) -> &'static str {
        "page_collector"
    }

    fn needs_input(&self) -> bool {
        self.state == SinkState::Accepting
    }

    fn add_input(&mut self, page: Page) -> Result<()> {
        if self.state != SinkState::Accepting {
            return Err(Error::illegal_state("page_collector is no longer accepting"));
        }
        if !page.is_empty() {
            self.pages.push(page);
        }
        Ok(())
    }

    fn finish(&mut self) {
        if self.state == SinkState::Accepting {
            self.state = SinkState::Finished;
        }
    }

    fn is_finished(&self) -> bool {
        self.state != SinkState::Accepting
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        if self.is_finished() {
            return Err(Error::illegal_state("get_output called on finished page_collector"));
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.state = SinkState::Closed;
    }
}

/// Hands every page to a callback and drops it afterwards.
pub struct PageConsumerSink<F> {
    consumer: F,
    finished: bool,
    pages: u64,
    positions: u64,
}

impl<F> PageConsumerSink<F>
where
    F: FnMut(&Page) -> Result<()> + Send,
{
    pub fn new(consumer: F) -> Self {
        Self {
            consumer,
            finished: false,
            pages: 0,
            positions: 0,
        }
    }

    pub fn pages_consumed(&self) -> u64 {
        self.pages
    }

    pub fn positions_consumed(&self) -> u64 {
        self.positions
    }
}

impl<F> Operator for PageConsumerSink<F>
where
    F: FnMut(&Page) -> Result<()> + Send,
{
    fn name(&self) -> &'static str {
        "page_consumer"
    }

    fn needs_input(&self) -> bool {
        !self.finished
    }

    fn add_input(&mut self, page: Page) -> Result<()> {
        if self.finished {
            return Err(Error::illegal_state("page_consumer is no longer accepting"));
        }
        (self.consumer)(&page)?;
        self.pages += 1;
        self.positions += page.position_count() as u64;
        Ok(())
    }

    fn finish(&mut self) {
        self.finished = true;
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        if self.finished {
            return Err(Error::illegal_state("get_output called on finished page_consumer"));
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageflow_core::types::Value;
    use pageflow_data::BlockFactory;

    #[test]
    fn collector_shares_pages_through_the_handle() {
        let factory = BlockFactory::with_limit(1 << 20);
        let pages = CollectedPages::new();
        let mut sink = PageCollectorSink::new(pages.clone());

        for n in [2, 0, 3] {
            let block = factory.new_constant_block(&Value::Long(n as i64), n).unwrap();
            sink.add_input(Page::new(vec![block]).unwrap()).unwrap();
        }
        assert_eq!(pages.page_count(), 2);
        assert_eq!(pages.position_count(), 5);
        assert!(sink.get_output().unwrap().is_none());

        sink.finish();
        assert!(sink.is_finished());
        assert!(sink.add_input(Page::default()).is_err());
        assert!(sink.get_output().is_err());
        sink.close();

        // collected pages outlive the sink
        assert!(factory.used_bytes() > 0);
        let taken = pages.take();
        assert_eq!(taken.len(), 2);
        assert_eq!(pages.page_count(), 0);
        drop(taken);
        assert_eq!(factory.used_bytes(), 0);
    }

    #[test]
    fn consumer_errors_propagate() {
        let mut seen = 0usize;
        let mut sink = PageConsumerSink::new(|page: &Page| {
            seen += page.position_count();
            if seen > 3 {
                return Err(Error::illegal_state("too many rows"));
            }
            Ok(())
        });
        sink.add_input(Page::with_position_count(2)).unwrap();
        assert!(sink.add_input(Page::with_position_count(2)).is_err());
        assert_eq!(sink.pages_consumed(), 1);
    }
}
