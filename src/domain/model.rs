use std::fmt;
use std::path::PathBuf;

/// A dependency the entrypoint can wait for before dispatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Queue,
    Database,
    Cache,
    Web,
}

impl Service {
    /// Wait order: a later service is only probed once the previous one is up.
    pub const ALL: [Service; 4] = [Service::Queue, Service::Database, Service::Cache, Service::Web];

    pub fn wait_flag(&self) -> &'static str {
        match self {
            Service::Queue => "WAIT_FOR_QUEUE",
            Service::Database => "WAIT_FOR_DB",
            Service::Cache => "WAIT_FOR_CACHE",
            Service::Web => "WAIT_FOR_WEB",
        }
    }

    pub fn host_var(&self) -> &'static str {
        match self {
            Service::Queue => "QUEUESERVER",
            Service::Database => "DBSERVER",
            Service::Cache => "CACHESERVER",
            Service::Web => "WEBSERVER",
        }
    }

    pub fn port_var(&self) -> &'static str {
        match self {
            Service::Queue => "QUEUEPORT",
            Service::Database => "DBPORT",
            Service::Cache => "CACHEPORT",
            Service::Web => "WEBPORT",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Service::Queue => "queue",
            Service::Database => "database",
            Service::Cache => "cache",
            Service::Web => "web",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub service: Service,
    pub host: String,
    pub port: u16,
}

impl ServiceEndpoint {
    pub fn new(service: Service, host: impl Into<String>, port: u16) -> Self {
        Self {
            service,
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One external invocation whose combined output is tee'd to `log_file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub program: String,
    pub args: Vec<String>,
    pub log_file: PathBuf,
}

impl Step {
    pub fn new<I, S>(program: impl Into<String>, args: I, log_file: PathBuf) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            log_file,
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a dispatch token expands to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub banner: String,
    /// Branch-specific values logged before the first step runs.
    pub notes: Vec<(String, String)>,
    pub steps: Vec<Step>,
}
