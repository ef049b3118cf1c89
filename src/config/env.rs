use crate::domain::model::{Service, ServiceEndpoint};
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

static TEMPLATE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid template pattern"));

/// Service endpoints and database credentials.
pub const SERVICE_DEFAULTS: &[(&str, &str)] = &[
    ("QUEUESERVER", "mq"),
    ("QUEUEPORT", "5672"),
    ("DBSERVER", "db"),
    ("DBPORT", "5432"),
    ("WEBSERVER", "web"),
    ("WEBPORT", "8000"),
    ("CACHESERVER", "cache"),
    ("CACHEPORT", "11211"),
    ("DBUSER", "webapp"),
    ("DBNAME", "${DBUSER}"),
    ("DBPASS", "${DBUSER}"),
];

/// Deployment flags and filesystem layout for the application.
pub const DJANGO_DEFAULTS: &[(&str, &str)] = &[
    ("DEPLOYMENT", "dev"),
    ("PRODUCTION", "0"),
    ("DEBUG", "1"),
    ("MEMCACHE", "${CACHESERVER}:${CACHEPORT}"),
    ("WRITABLE_DIRECTORY", "/data/scratch"),
    ("STATIC_ROOT", "/data/static"),
    ("MEDIA_ROOT", "/data/static/media"),
    ("LOG_DIRECTORY", "/data/log"),
    ("DJANGO_SETTINGS_MODULE", "bpam.settings"),
];

pub const UWSGI_OPTS_DEFAULT: &str = "/app/uwsgi/docker.ini";
pub const RUNSERVER_OPTS_DEFAULT: &str =
    "runserver_plus 0.0.0.0:${WEBPORT} --settings=${DJANGO_SETTINGS_MODULE}";

const PATH_VARS: &[&str] = &["WRITABLE_DIRECTORY", "STATIC_ROOT", "MEDIA_ROOT", "LOG_DIRECTORY"];

fn is_endpoint_var(key: &str) -> bool {
    Service::ALL
        .iter()
        .any(|service| service.host_var() == key || service.port_var() == key)
}

pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment. Non UTF-8 values are read lossily.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var_os(key).map(|v| v.to_string_lossy().into_owned())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Expands `${NAME}` references; names the lookup doesn't know become empty.
pub fn expand_template<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    TEMPLATE_VAR
        .replace_all(template, |caps: &Captures| lookup(&caps[1]).unwrap_or_default())
        .into_owned()
}

/// Like [`expand_template`] but leaves unknown references untouched.
pub fn substitute_known<F>(content: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    TEMPLATE_VAR
        .replace_all(content, |caps: &Captures| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Set-if-unset resolution: a variable present in the environment wins, even
/// when empty, except for service endpoints. Otherwise the file override, then the built-in fallback, is
/// expanded against what has been resolved so far.
pub struct Resolver<'a, E: EnvSource> {
    env: &'a E,
    overrides: &'a BTreeMap<String, String>,
    resolved: BTreeMap<String, String>,
}

impl<'a, E: EnvSource> Resolver<'a, E> {
    pub fn new(env: &'a E, overrides: &'a BTreeMap<String, String>) -> Self {
        Self {
            env,
            overrides,
            resolved: BTreeMap::new(),
        }
    }

    pub fn resolve(&mut self, key: &str, fallback: &str) -> String {
        let preset = self.env.var(key);
        self.resolve_from(key, preset, fallback)
    }

    /// Like [`Resolver::resolve`] but an empty value counts as unset.
    pub fn resolve_non_empty(&mut self, key: &str, fallback: &str) -> String {
        let preset = self.env.var(key).filter(|v| !v.is_empty());
        self.resolve_from(key, preset, fallback)
    }

    fn resolve_from(&mut self, key: &str, preset: Option<String>, fallback: &str) -> String {
        let value = match preset {
            Some(value) => value,
            None => {
                let template = self.overrides.get(key).map(String::as_str).unwrap_or(fallback);
                expand_template(template, |name| {
                    self.resolved.get(name).cloned().or_else(|| self.env.var(name))
                })
            }
        };
        self.resolved.insert(key.to_string(), value.clone());
        value
    }

    /// Service hosts and ports fall back when empty as well as when unset.
    pub fn defaults(&mut self) {
        for (key, fallback) in SERVICE_DEFAULTS {
            if is_endpoint_var(key) {
                self.resolve_non_empty(key, fallback);
            } else {
                self.resolve(key, fallback);
            }
        }
    }

    pub fn django_defaults(&mut self) {
        for (key, fallback) in DJANGO_DEFAULTS {
            self.resolve(key, fallback);
        }
    }

    /// Presence-as-boolean: set and non-empty.
    pub fn flag(&self, key: &str) -> bool {
        self.env
            .var(key)
            .or_else(|| self.overrides.get(key).cloned())
            .is_some_and(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    exported: BTreeMap<String, String>,
    endpoints: Vec<ServiceEndpoint>,
    wait_flags: HashSet<Service>,
    pub uwsgi_opts: String,
    pub runserver_opts: String,
}

impl Settings {
    pub fn resolve<E: EnvSource>(env: &E, overrides: &BTreeMap<String, String>) -> Result<Self> {
        let mut resolver = Resolver::new(env, overrides);
        resolver.defaults();
        resolver.django_defaults();

        let wait_flags = Service::ALL
            .into_iter()
            .filter(|service| resolver.flag(service.wait_flag()))
            .collect();

        // Branch options read the exported values but are not exported themselves.
        let exported = resolver.resolved.clone();
        let uwsgi_opts = resolver.resolve("UWSGI_OPTS", UWSGI_OPTS_DEFAULT);
        let runserver_opts = resolver.resolve("RUNSERVER_OPTS", RUNSERVER_OPTS_DEFAULT);

        let mut endpoints = Vec::with_capacity(Service::ALL.len());
        for service in Service::ALL {
            let host = exported.get(service.host_var()).cloned().unwrap_or_default();
            let raw_port = exported.get(service.port_var()).map(String::as_str).unwrap_or_default();
            let port = validation::validate_port(service.port_var(), raw_port)?;
            endpoints.push(ServiceEndpoint::new(service, host, port));
        }

        Ok(Self {
            exported,
            endpoints,
            wait_flags,
            uwsgi_opts,
            runserver_opts,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.exported.get(key).map(String::as_str)
    }

    pub fn settings_module(&self) -> &str {
        self.get("DJANGO_SETTINGS_MODULE").unwrap_or_default()
    }

    pub fn endpoint(&self, service: Service) -> Option<&ServiceEndpoint> {
        self.endpoints.iter().find(|e| e.service == service)
    }

    pub fn is_waiting_for(&self, service: Service) -> bool {
        self.wait_flags.contains(&service)
    }

    /// Endpoints to wait for, in wait order.
    pub fn wait_targets(&self) -> Vec<ServiceEndpoint> {
        self.endpoints
            .iter()
            .filter(|e| self.is_waiting_for(e.service))
            .cloned()
            .collect()
    }

    /// Variables handed to every child process.
    pub fn exported_env(&self) -> Vec<(String, String)> {
        self.exported.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Sorted, with anything that looks like a password left out.
    pub fn redacted(&self) -> Vec<(&str, &str)> {
        self.exported
            .iter()
            .filter(|(k, _)| !k.to_ascii_uppercase().contains("PASS"))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    pub fn log_resolved(&self) {
        for (key, _) in DJANGO_DEFAULTS {
            tracing::info!("{} is {}", key, self.get(key).unwrap_or_default());
        }
        for (key, value) in self.redacted() {
            tracing::debug!("{}={}", key, value);
        }
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        for endpoint in &self.endpoints {
            validation::validate_non_empty_string(endpoint.service.host_var(), &endpoint.host)?;
        }
        validation::validate_non_empty_string("DJANGO_SETTINGS_MODULE", self.settings_module())?;
        for key in PATH_VARS {
            validation::validate_path(key, self.get(key).unwrap_or_default())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn resolve(pairs: &[(&str, &str)]) -> Settings {
        Settings::resolve(&env(pairs), &BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_empty_environment_gets_documented_defaults() {
        let settings = resolve(&[]);

        assert_eq!(settings.get("QUEUESERVER"), Some("mq"));
        assert_eq!(settings.get("QUEUEPORT"), Some("5672"));
        assert_eq!(settings.get("DBSERVER"), Some("db"));
        assert_eq!(settings.get("DBPORT"), Some("5432"));
        assert_eq!(settings.get("WEBSERVER"), Some("web"));
        assert_eq!(settings.get("WEBPORT"), Some("8000"));
        assert_eq!(settings.get("CACHESERVER"), Some("cache"));
        assert_eq!(settings.get("CACHEPORT"), Some("11211"));
        assert_eq!(settings.get("DBUSER"), Some("webapp"));
        assert_eq!(settings.get("DBNAME"), Some("webapp"));
        assert_eq!(settings.get("DBPASS"), Some("webapp"));
        assert_eq!(settings.get("MEMCACHE"), Some("cache:11211"));
        assert_eq!(settings.get("DEPLOYMENT"), Some("dev"));
        assert_eq!(settings.get("PRODUCTION"), Some("0"));
        assert_eq!(settings.get("DEBUG"), Some("1"));
        assert_eq!(settings.uwsgi_opts, "/app/uwsgi/docker.ini");
        assert_eq!(
            settings.runserver_opts,
            "runserver_plus 0.0.0.0:8000 --settings=bpam.settings"
        );
        assert!(settings.wait_targets().is_empty());
        assert_eq!(settings.endpoint(Service::Cache).map(|e| e.port), Some(11211));
    }

    #[test]
    fn test_derived_defaults_follow_overridden_user() {
        let settings = resolve(&[("DBUSER", "foo")]);

        assert_eq!(settings.get("DBUSER"), Some("foo"));
        assert_eq!(settings.get("DBNAME"), Some("foo"));
        assert_eq!(settings.get("DBPASS"), Some("foo"));
    }

    #[test]
    fn test_preset_values_always_win() {
        let settings = resolve(&[
            ("DBUSER", "foo"),
            ("DBNAME", "bar"),
            ("CACHESERVER", "memcached"),
            ("DEPLOYMENT", ""),
        ]);

        assert_eq!(settings.get("DBNAME"), Some("bar"));
        assert_eq!(settings.get("DBPASS"), Some("foo"));
        assert_eq!(settings.get("MEMCACHE"), Some("memcached:11211"));
        // present but empty is still "set"
        assert_eq!(settings.get("DEPLOYMENT"), Some(""));
    }

    #[test]
    fn test_file_overrides_replace_fallbacks_only() {
        let overrides: BTreeMap<String, String> = [
            ("DEPLOYMENT".to_string(), "prod".to_string()),
            ("DBPASS".to_string(), "${DBNAME}-secret".to_string()),
            ("DBSERVER".to_string(), "file-db".to_string()),
        ]
        .into_iter()
        .collect();
        let settings = Settings::resolve(&env(&[("DBSERVER", "env-db")]), &overrides).unwrap();

        assert_eq!(settings.get("DEPLOYMENT"), Some("prod"));
        assert_eq!(settings.get("DBPASS"), Some("webapp-secret"));
        assert_eq!(settings.get("DBSERVER"), Some("env-db"));
    }

    #[test]
    fn test_wait_flags_need_a_non_empty_value() {
        let settings = resolve(&[
            ("WAIT_FOR_WEB", "1"),
            ("WAIT_FOR_QUEUE", "yes"),
            ("WAIT_FOR_DB", ""),
            ("DBSERVER", "postgres"),
        ]);

        let targets = settings.wait_targets();
        let services: Vec<Service> = targets.iter().map(|e| e.service).collect();
        assert_eq!(services, vec![Service::Queue, Service::Web]);
        assert_eq!(targets[0].to_string(), "mq:5672");
        assert!(!settings.is_waiting_for(Service::Database));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let result = Settings::resolve(&env(&[("CACHEPORT", "memcache")]), &BTreeMap::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_branch_options_are_not_exported() {
        let settings = resolve(&[("WEBPORT", "9000"), ("DJANGO_SETTINGS_MODULE", "bpam.test")]);

        assert_eq!(
            settings.runserver_opts,
            "runserver_plus 0.0.0.0:9000 --settings=bpam.test"
        );
        let exported = settings.exported_env();
        assert!(exported.iter().all(|(k, _)| k != "RUNSERVER_OPTS" && k != "UWSGI_OPTS"));
        assert!(exported.iter().any(|(k, v)| k == "DBPASS" && v == "webapp"));
    }

    #[test]
    fn test_redacted_dump_hides_passwords() {
        let settings = resolve(&[]);
        let dump = settings.redacted();

        assert!(dump.iter().all(|(k, _)| *k != "DBPASS"));
        assert!(dump.iter().any(|(k, _)| *k == "DBUSER"));
        let keys: Vec<&str> = dump.iter().map(|(k, _)| *k).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_empty_endpoint_variables_fall_back() {
        let settings = resolve(&[("WEBSERVER", ""), ("DBPORT", ""), ("DBUSER", "")]);

        assert_eq!(settings.get("WEBSERVER"), Some("web"));
        assert_eq!(settings.get("DBPORT"), Some("5432"));
        assert_eq!(settings.endpoint(Service::Web).unwrap().host, "web");
        assert_eq!(settings.endpoint(Service::Database).unwrap().port, 5432);
        // credentials keep set-if-unset semantics
        assert_eq!(settings.get("DBUSER"), Some(""));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_empty_host() {
        let overrides: BTreeMap<String, String> =
            [("WEBSERVER".to_string(), String::new())].into_iter().collect();
        let settings = Settings::resolve(&HashMap::new(), &overrides).unwrap();

        assert_eq!(settings.get("WEBSERVER"), Some(""));
        assert!(settings.validate().is_err());
        assert!(resolve(&[]).validate().is_ok());
    }

    #[test]
    fn test_template_expansion() {
        let lookup = |name: &str| (name == "A").then(|| "x".to_string());

        assert_eq!(expand_template("${A}-${B}", lookup), "x-");
        assert_eq!(substitute_known("${A}-${B}", lookup), "x-${B}");
        assert_eq!(expand_template("no refs", lookup), "no refs");
    }
}
