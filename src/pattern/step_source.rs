// The wrapping downbeat counter. One per scheduler loop, never shared.

#[derive(Clone, Debug)]
pub struct StepIndexSource {
    len: u32,
    cursor: u32,
}

impl StepIndexSource {
    pub fn new(len: u32) -> Self {
        // an empty range can't tick; tracks reject it before we get here
        Self { len: len.max(1), cursor: 0 }
    }

    /// Returns the current step and advances, wrapping back to 0 after `len - 1`.
    pub fn next(&mut self) -> u32 {
        let step = self.cursor;
        self.cursor = if step + 1 >= self.len { 0 } else { step + 1 };
        step
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    // the step the next call to `next` will hand out
    pub fn position(&self) -> u32 {
        self.cursor
    }

    pub fn len(&self) -> u32 {
        self.len
    }
}
