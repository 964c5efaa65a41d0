use std::time::Duration;

use crate::similarity::Threshold;

use super::args_helper::args;

args! {
    #[derive(Clone, Debug)]
    Sampling {
        "Playback time between two frames that are compared with each other"
        stride: humantime::Duration = Duration::from_secs(50).into();

        "Frames at least this similar (0, 1] are considered to show the same slide"
        similarity_threshold: Threshold = Threshold::DEFAULT;
    }
}

impl SamplingArgs {
    pub fn stride_duration(&self) -> Duration {
        self.stride.into()
    }
}
