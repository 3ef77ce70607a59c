// one stereo frame; the output callback spreads these over the device's channels
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn mono(&self) -> f32 {
        (self.left + self.right) * 0.5
    }
}
