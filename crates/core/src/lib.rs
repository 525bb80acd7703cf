pub mod camera {
    pub mod domain {
        pub mod camera_source;
    }
    pub mod infrastructure;
}

pub mod detection {
    pub mod domain {
        pub mod detected_face;
        pub mod detector_ladder;
        pub mod embedding;
        pub mod inference_provider;
    }
    pub mod infrastructure;
}

pub mod evidence {
    pub mod domain {
        pub mod snapshot_encoder;
    }
    pub mod infrastructure;
}

pub mod monitoring {
    pub mod domain {
        pub mod detection_result;
        pub mod reference_face;
        pub mod session;
        pub mod violation;
    }
    pub mod face_monitor;
    pub mod monitor_config;
    pub mod monitor_event;
    mod sampler;

    pub use sampler::{SkipReason, TickOutcome};
}

pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod region;
}
