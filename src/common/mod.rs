pub mod client {
    pub mod models {
        pub mod common;
        pub mod video;
    }
    #[allow(clippy::module_inception)]
    pub mod client;
}

pub mod config;
pub mod logger;
