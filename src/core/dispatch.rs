use crate::config::env::Settings;
use crate::config::toml_config::FileConfig;
use crate::domain::model::{Plan, Step};
use crate::domain::ports::ProcessRunner;
use crate::utils::error::{EntrypointError, Result};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Nuclear,
    Runscript,
    IngestAll,
    Superuser,
    Checksecure,
    Uwsgi,
    Runserver,
    Runtests,
    Lettuce,
}

impl Builtin {
    pub const ALL: [Builtin; 9] = [
        Builtin::Nuclear,
        Builtin::Runscript,
        Builtin::IngestAll,
        Builtin::Superuser,
        Builtin::Checksecure,
        Builtin::Uwsgi,
        Builtin::Runserver,
        Builtin::Runtests,
        Builtin::Lettuce,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Nuclear => "nuclear",
            Builtin::Runscript => "runscript",
            Builtin::IngestAll => "ingest_all",
            Builtin::Superuser => "superuser",
            Builtin::Checksecure => "checksecure",
            Builtin::Uwsgi => "uwsgi",
            Builtin::Runserver => "runserver",
            Builtin::Runtests => "runtests",
            Builtin::Lettuce => "lettuce",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == token)
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Builtin { command: Builtin, args: Vec<String> },
    /// Anything else is exec'd as given.
    Passthrough(Vec<String>),
}

impl Invocation {
    pub fn parse(argv: &[String]) -> Self {
        match argv.split_first() {
            Some((token, rest)) => match Builtin::from_token(token) {
                Some(command) => Invocation::Builtin {
                    command,
                    args: rest.to_vec(),
                },
                None => Invocation::Passthrough(argv.to_vec()),
            },
            None => Invocation::Passthrough(Vec::new()),
        }
    }
}

pub fn usage() -> String {
    let names: Vec<&str> = Builtin::ALL.iter().map(Builtin::name).collect();
    format!("[RUN]: Builtin command not provided [{}]", names.join("|"))
}

pub struct Dispatcher<'a> {
    settings: &'a Settings,
    config: &'a FileConfig,
}

impl<'a> Dispatcher<'a> {
    pub fn new(settings: &'a Settings, config: &'a FileConfig) -> Self {
        Self { settings, config }
    }

    fn log_file(&self, name: &str) -> PathBuf {
        self.config.data_directory().join(name)
    }

    fn settings_arg(&self) -> String {
        format!("--settings={}", self.settings.settings_module())
    }

    fn admin(&self, args: &[&str], log: &str) -> Step {
        self.admin_owned(args.iter().map(|a| a.to_string()).collect(), log)
    }

    fn admin_owned(&self, mut args: Vec<String>, log: &str) -> Step {
        args.push(self.settings_arg());
        Step::new(self.config.admin(), args, self.log_file(log))
    }

    pub fn plan(&self, command: Builtin, args: &[String]) -> Result<Plan> {
        let mut notes = Vec::new();
        let (banner, steps) = match command {
            Builtin::Nuclear => (
                "[Run] Resetting database",
                vec![
                    self.admin(
                        &["reset_db", "--router=default", "--noinput", "--traceback"],
                        "nuclear.log",
                    ),
                    self.admin(&["migrate", "--noinput", "--traceback"], "nuclear-migrate.log"),
                ],
            ),
            Builtin::Runscript => {
                let (script, script_args) = args.split_first().ok_or_else(|| EntrypointError::UsageError {
                    message: "runscript requires a script name".to_string(),
                })?;
                let mut step_args = vec!["runscript".to_string(), script.clone()];
                step_args.push("--traceback".to_string());
                if !script_args.is_empty() {
                    step_args.push("--script-args".to_string());
                    step_args.extend(script_args.iter().cloned());
                }
                notes.push(("Script".to_string(), script.clone()));
                (
                    "[Run] Running script",
                    vec![self.admin_owned(step_args, "runscript.log")],
                )
            }
            Builtin::IngestAll => (
                "[Run] Ingest All",
                vec![self.admin(&["runscript", "ingest_all", "--traceback"], "ingest.log")],
            ),
            Builtin::Superuser => (
                "[Run] Creating superuser",
                vec![self.admin(&["createsuperuser", "--traceback"], "superuser.log")],
            ),
            Builtin::Checksecure => (
                "[Run] Running Django checksecure",
                vec![self.admin(&["checksecure", "--traceback"], "checksecure.log")],
            ),
            Builtin::Uwsgi => {
                notes.push(("UWSGI_OPTS".to_string(), self.settings.uwsgi_opts.clone()));
                (
                    "[Run] Starting uwsgi",
                    vec![
                        self.admin(&["collectstatic", "--noinput"], "uwsgi-collectstatic.log"),
                        self.admin(&["migrate", "--noinput"], "uwsgi-migrate.log"),
                        Step::new(
                            self.config.uwsgi(),
                            ["--die-on-term", "--ini", self.settings.uwsgi_opts.as_str()],
                            self.log_file("uwsgi.log"),
                        ),
                    ],
                )
            }
            Builtin::Runserver => {
                notes.push(("RUNSERVER_OPTS".to_string(), self.settings.runserver_opts.clone()));
                (
                    "[Run] Starting runserver",
                    vec![
                        self.admin(&["collectstatic", "--noinput"], "runserver-collectstatic.log"),
                        self.admin(&["migrate", "--noinput"], "runserver-migrate.log"),
                        Step::new(
                            self.config.admin(),
                            self.settings.runserver_opts.split_whitespace(),
                            self.log_file("runserver.log"),
                        ),
                    ],
                )
            }
            Builtin::Runtests => (
                "[Run] Starting tests",
                vec![self.admin(&["test", "--noinput"], "runtests.log")],
            ),
            Builtin::Lettuce => {
                let xunit = format!(
                    "--xunit-file={}",
                    self.log_file("tests.xml").to_string_lossy()
                );
                (
                    "[Run] Starting lettuce",
                    vec![self.admin_owned(
                        vec!["run_lettuce".to_string(), "--with-xunit".to_string(), xunit],
                        "lettuce.log",
                    )],
                )
            }
        };

        Ok(Plan {
            banner: banner.to_string(),
            notes,
            steps,
        })
    }

    /// Returns the exit code the entrypoint should terminate with.
    pub async fn dispatch<R: ProcessRunner>(&self, runner: &R, invocation: &Invocation) -> Result<i32> {
        let env = self.settings.exported_env();
        match invocation {
            Invocation::Builtin { command, args } => {
                let plan = self.plan(*command, args)?;
                Ok(run_plan(runner, &plan, &env).await)
            }
            Invocation::Passthrough(argv) => {
                println!("{}", usage());
                println!("[RUN]: {}", argv.join(" "));
                if argv.is_empty() {
                    return Ok(0);
                }
                tracing::info!("Executing {}", argv.join(" "));
                runner.exec(argv, &env).await
            }
        }
    }
}

/// Runs every step even if an earlier one fails; the last exit code wins.
pub async fn run_plan<R: ProcessRunner>(runner: &R, plan: &Plan, env: &[(String, String)]) -> i32 {
    tracing::info!("{}", plan.banner);
    for (key, value) in &plan.notes {
        tracing::info!("{} is {}", key, value);
    }

    let mut last = 0;
    for step in &plan.steps {
        tracing::info!("Running {} (log: {})", step.command_line(), step.log_file.display());
        last = match runner.run_teed(step, env).await {
            Ok(code) => code,
            Err(e) => {
                tracing::error!("{}", e);
                e.exit_code()
            }
        };
        if last != 0 {
            tracing::warn!("{} exited with {}", step.program, last);
        }
    }
    last
}
