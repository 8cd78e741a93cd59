// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::blocking::delay::DelayMs;

/// A delay that doesn't actually wait, but remembers how long it was asked to.
///
/// Like [`MockSensorBus`][crate::MockSensorBus], clones share the same record.
#[derive(Clone, Debug, Default)]
pub struct MockDelay {
    delays: Rc<RefCell<Vec<u32>>>,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far (in milliseconds), in order.
    pub fn delays(&self) -> Vec<u32> {
        self.delays.borrow().clone()
    }
}

impl DelayMs<u32> for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.delays.borrow_mut().push(ms);
    }
}
