//! Shared state for driving a single layer in tests.
use crate::config::Config;
use crate::timer::Timers;

use super::{ip, Context, TimerEvent};

pub(crate) struct Harness {
    pub config: Config,
    pub ip: ip::Endpoint,
    pub timers: Timers<TimerEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Harness::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Harness {
            config,
            ip: ip::Endpoint::new(),
            timers: Timers::new(),
        }
    }

    pub fn cx(&mut self) -> Context<'_> {
        Context { config: &self.config, ip: &mut self.ip, timers: &mut self.timers }
    }
}
