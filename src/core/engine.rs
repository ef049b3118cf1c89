use crate::config::env::{EnvSource, Settings};
use crate::config::toml_config::FileConfig;
use crate::core::dispatch::{Dispatcher, Invocation};
use crate::core::waiter::ReadinessWaiter;
use crate::core::{ProcessRunner, Probe, Sleeper};
use crate::utils::error::Result;
use crate::utils::validation::Validate;

/// Resolve defaults, wait for dependencies, dispatch.
pub struct Entrypoint<P: Probe, S: Sleeper, R: ProcessRunner> {
    waiter: ReadinessWaiter<P, S>,
    runner: R,
    config: FileConfig,
}

impl<P: Probe, S: Sleeper, R: ProcessRunner> Entrypoint<P, S, R> {
    pub fn new(probe: P, sleeper: S, runner: R, config: FileConfig) -> Self {
        let waiter = ReadinessWaiter::new(probe, sleeper, config.wait_interval());
        Self {
            waiter,
            runner,
            config,
        }
    }

    pub async fn run<E: EnvSource>(&self, env: &E, argv: &[String]) -> Result<i32> {
        let settings = Settings::resolve(env, &self.config.defaults)?;
        settings.validate()?;
        settings.log_resolved();

        self.waiter.wait_for_services(&settings).await;

        let invocation = Invocation::parse(argv);
        Dispatcher::new(&settings, &self.config)
            .dispatch(&self.runner, &invocation)
            .await
    }
}
