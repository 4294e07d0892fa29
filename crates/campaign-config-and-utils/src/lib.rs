//! Configuration, paths, and logging bootstrap for the campaign dispatch services.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    ChannelSettings, Config, PipelineSettings, SchedulerSettings, LOOKAHEAD_CAP_MINUTES,
    LOOKBACK_CAP_MINUTES,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service};
pub use paths::Paths;
