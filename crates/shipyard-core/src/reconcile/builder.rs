//! Resource Builder - App から望ましいリソース集合への決定的な写像
//!
//! 4 種類のオブジェクトはすべて app_id から命名され、テナントと app の
//! ラベルを持ちます（後で Pod / イベントをラベルで引くため）。
//!
//! # ロールアウトのトリガー
//! Pod テンプレートの annotation に現在の content hash を入れます。
//! オーケストレータは Pod テンプレートが変わったときだけ Pod を作り直すので、
//! デプロイ済みコンテンツが変わったときに限って再起動が起きます。

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use crate::config::{PlatformConfig, ProbeTiming};
use crate::domain::resources::{
    CodeBundle, Container, EnvVar, Exposure, HttpProbe, ObjectMeta, PodTemplate, PortMapping, ResourceQuantities,
    ResourceRequirements, RoutingRule, VolumeMount, Workload,
};
use crate::domain::{App, AppContent, AppId, DesiredResources, LabelSelector, PlatformError};
use crate::validator::SINGLE_FILE_NAME;

/// Code bundle mount point inside the container.
pub const APP_ROOT: &str = "/app";

pub const ENV_ENTRYPOINT: &str = "APP_ENTRYPOINT";
pub const ENV_FRAMEWORK: &str = "APP_FRAMEWORK";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_PORT: &str = "PORT";

/// プラットフォームが設定する環境変数（ユーザーは上書き不可）
pub const RESERVED_ENV_VARS: &[&str] = &[ENV_ENTRYPOINT, ENV_FRAMEWORK, ENV_DATABASE_URL, ENV_PORT];

const CONTAINER_NAME: &str = "app";
const MAX_LABEL_VALUE: usize = 63;

static ENV_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("env name pattern compiles"));

pub fn workload_name(app_id: &AppId) -> String {
    format!("app-{app_id}")
}

pub fn code_bundle_name(app_id: &AppId) -> String {
    format!("app-{app_id}-code")
}

pub fn host(app_id: &AppId, config: &PlatformConfig) -> String {
    format!("app-{app_id}.{}", config.cluster.platform_domain)
}

pub fn deployment_url(app_id: &AppId, config: &PlatformConfig) -> String {
    format!("{}://{}", config.cluster.url_scheme, host(app_id, config))
}

/// ユーザー環境変数の名前を検証
pub fn check_env_vars(env_vars: &BTreeMap<String, String>) -> Result<(), PlatformError> {
    for name in env_vars.keys() {
        if !ENV_NAME.is_match(name) {
            return Err(PlatformError::InvalidRequest(format!(
                "invalid environment variable name: {name:?}"
            )));
        }
        if RESERVED_ENV_VARS.contains(&name.as_str()) {
            return Err(PlatformError::InvalidRequest(format!(
                "environment variable {name} is reserved by the platform"
            )));
        }
    }
    Ok(())
}

/// Label values allow `[A-Za-z0-9._-]`, at most 63 characters, alphanumeric
/// at both ends.
fn label_value(raw: &str) -> String {
    let mut value: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' })
        .take(MAX_LABEL_VALUE)
        .collect();
    while value.ends_with(|c: char| !c.is_ascii_alphanumeric()) {
        value.pop();
    }
    value.trim_start_matches(|c: char| !c.is_ascii_alphanumeric()).to_string()
}

/// ResourceBuilder は App を 4 つのリソースに変換
///
/// 差分は取りません。毎回すべてを組み立て直し、収束は create-or-patch に任せます。
pub struct ResourceBuilder<'a> {
    config: &'a PlatformConfig,
}

impl<'a> ResourceBuilder<'a> {
    pub fn new(config: &'a PlatformConfig) -> Self {
        Self { config }
    }

    fn key(&self, name: &str) -> String {
        format!("{}/{name}", self.config.cluster.label_prefix)
    }

    /// Labels every object carries.
    pub fn labels(&self, app: &App) -> BTreeMap<String, String> {
        let mut labels = self.selector(&app.app_id).0;
        labels.insert(self.key("tenant"), label_value(app.owner_id.as_str()));
        labels.insert(self.key("managed-by"), "shipyard".to_string());
        labels
    }

    /// Selects the pods of one app.
    pub fn selector(&self, app_id: &AppId) -> LabelSelector {
        let mut selector = BTreeMap::new();
        selector.insert(self.key("app-id"), app_id.to_string());
        LabelSelector(selector)
    }

    fn meta(&self, name: String, app: &App) -> ObjectMeta {
        ObjectMeta {
            name,
            namespace: self.config.cluster.namespace.clone(),
            labels: self.labels(app),
            annotations: BTreeMap::new(),
        }
    }

    fn code_bundle(&self, app: &App) -> CodeBundle {
        let data = match &app.deployed {
            AppContent::Single { code } => BTreeMap::from([(SINGLE_FILE_NAME.to_string(), code.clone())]),
            AppContent::Multi { files, .. } => files.clone(),
        };
        CodeBundle {
            metadata: self.meta(code_bundle_name(&app.app_id), app),
            data,
        }
    }

    fn env(&self, app: &App, database_url: String) -> Vec<EnvVar> {
        let entry = match &app.deployed {
            AppContent::Single { .. } => SINGLE_FILE_NAME,
            AppContent::Multi { entrypoint, .. } => entrypoint.as_str(),
        };
        let var = |name: &str, value: String| EnvVar {
            name: name.to_string(),
            value,
        };

        let mut env = vec![var(ENV_ENTRYPOINT, format!("{APP_ROOT}/{entry}"))];
        if let Some(framework) = app.framework {
            env.push(var(ENV_FRAMEWORK, framework.as_str().to_string()));
        }
        env.push(var(ENV_DATABASE_URL, database_url));
        env.push(var(ENV_PORT, self.config.cluster.container_port.to_string()));
        env.extend(
            app.env_vars
                .iter()
                .filter(|(name, _)| !RESERVED_ENV_VARS.contains(&name.as_str()))
                .map(|(name, value)| var(name, value.clone())),
        );
        env
    }

    fn probe(&self, timing: ProbeTiming) -> HttpProbe {
        HttpProbe {
            path: self.config.cluster.health_path.clone(),
            port: self.config.cluster.container_port,
            initial_delay_seconds: timing.initial_delay_seconds,
            period_seconds: timing.period_seconds,
        }
    }

    fn workload(&self, app: &App, database_url: String) -> Workload {
        let tier = &self.config.resources;
        let selector = self.selector(&app.app_id);

        let mut annotations = BTreeMap::new();
        annotations.insert(self.key("content-hash"), app.content_hash());

        let mut pod_labels = self.labels(app);
        pod_labels.extend(selector.0.clone());

        Workload {
            metadata: self.meta(workload_name(&app.app_id), app),
            replicas: 1,
            selector,
            template: PodTemplate {
                labels: pod_labels,
                annotations,
                container: Container {
                    name: CONTAINER_NAME.to_string(),
                    image: self.config.cluster.runtime_image.clone(),
                    port: self.config.cluster.container_port,
                    env: self.env(app, database_url),
                    resources: ResourceRequirements {
                        requests: ResourceQuantities {
                            cpu: tier.cpu_request.clone(),
                            memory: tier.memory_request.clone(),
                        },
                        limits: ResourceQuantities {
                            cpu: tier.cpu_limit.clone(),
                            memory: tier.memory_limit.clone(),
                        },
                    },
                    liveness: self.probe(self.config.probes.liveness),
                    readiness: self.probe(self.config.probes.readiness),
                    mounts: vec![VolumeMount {
                        source: code_bundle_name(&app.app_id),
                        mount_path: APP_ROOT.to_string(),
                    }],
                },
            },
        }
    }

    fn exposure(&self, app: &App) -> Exposure {
        Exposure {
            metadata: self.meta(workload_name(&app.app_id), app),
            selector: self.selector(&app.app_id),
            ports: vec![PortMapping {
                port: self.config.cluster.service_port,
                target_port: self.config.cluster.container_port,
            }],
        }
    }

    fn routing(&self, app: &App) -> RoutingRule {
        let cluster = &self.config.cluster;
        RoutingRule {
            metadata: self.meta(workload_name(&app.app_id), app),
            api_version: cluster.routing_api_version.clone(),
            kind: cluster.routing_kind.clone(),
            spec: json!({
                "entryPoints": cluster.routing_entry_points,
                "routes": [{
                    "match": format!("Host(`{}`)", host(&app.app_id, self.config)),
                    "kind": "Rule",
                    "services": [{
                        "name": workload_name(&app.app_id),
                        "port": cluster.service_port,
                    }],
                }],
            }),
        }
    }

    /// App から望ましいリソース集合を組み立てる
    ///
    /// `database_url` は資格情報プロバイダが返した不透明な文字列です。
    pub fn build(&self, app: &App, database_url: String) -> DesiredResources {
        DesiredResources {
            code: self.code_bundle(app),
            workload: self.workload(app, database_url),
            exposure: self.exposure(app),
            routing: self.routing(app),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Framework, OwnerId};
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn app(content: AppContent, framework: Option<Framework>) -> App {
        let mut env = BTreeMap::new();
        env.insert("API_KEY".to_string(), "k".to_string());
        App::new(
            AppId::parse("01hx").unwrap(),
            OwnerId::new("tenant@example.com"),
            "demo".to_string(),
            content,
            framework,
            env,
            None,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn single() -> App {
        app(AppContent::Single { code: "app = FastAPI()".into() }, None)
    }

    fn multi() -> App {
        let files = BTreeMap::from([
            ("server.py".to_string(), "app = FastAPI()".to_string()),
            ("util.py".to_string(), "X = 1".to_string()),
        ]);
        app(
            AppContent::Multi {
                files,
                entrypoint: "server.py".into(),
            },
            Some(Framework::FastApi),
        )
    }

    fn env_value<'a>(w: &'a Workload, name: &str) -> Option<&'a str> {
        w.template.container.env.iter().find(|e| e.name == name).map(|e| e.value.as_str())
    }

    #[test]
    fn names_derive_from_app_id() {
        let config = PlatformConfig::default();
        let desired = ResourceBuilder::new(&config).build(&single(), "postgres://db".into());
        assert_eq!(desired.code.metadata.name, "app-01hx-code");
        assert_eq!(desired.workload.metadata.name, "app-01hx");
        assert_eq!(desired.exposure.metadata.name, "app-01hx");
        assert_eq!(desired.routing.metadata.name, "app-01hx");
        assert!(desired.in_apply_order().iter().all(|r| r.metadata().namespace == "apps"));
    }

    #[test]
    fn single_file_uses_fixed_key() {
        let config = PlatformConfig::default();
        let desired = ResourceBuilder::new(&config).build(&single(), "postgres://db".into());
        assert_eq!(desired.code.data.keys().collect::<Vec<_>>(), vec!["main.py"]);
        assert_eq!(env_value(&desired.workload, ENV_ENTRYPOINT), Some("/app/main.py"));
        assert_eq!(env_value(&desired.workload, ENV_FRAMEWORK), None);
    }

    #[test]
    fn multi_file_stores_one_key_per_file() {
        let config = PlatformConfig::default();
        let desired = ResourceBuilder::new(&config).build(&multi(), "postgres://db".into());
        assert_eq!(desired.code.data.len(), 2);
        assert_eq!(env_value(&desired.workload, ENV_ENTRYPOINT), Some("/app/server.py"));
        assert_eq!(env_value(&desired.workload, ENV_FRAMEWORK), Some("fastapi"));
        assert_eq!(desired.workload.template.container.mounts[0].mount_path, APP_ROOT);
        assert_eq!(desired.workload.template.container.mounts[0].source, "app-01hx-code");
    }

    #[test]
    fn platform_env_precedes_user_env() {
        let config = PlatformConfig::default();
        let desired = ResourceBuilder::new(&config).build(&single(), "postgres://db".into());
        let names: Vec<&str> = desired.workload.template.container.env.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![ENV_ENTRYPOINT, ENV_DATABASE_URL, ENV_PORT, "API_KEY"]);
        assert_eq!(env_value(&desired.workload, ENV_DATABASE_URL), Some("postgres://db"));
        assert_eq!(env_value(&desired.workload, ENV_PORT), Some("8000"));
    }

    #[test]
    fn liveness_is_slower_than_readiness() {
        let config = PlatformConfig::default();
        let desired = ResourceBuilder::new(&config).build(&single(), String::new());
        let c = &desired.workload.template.container;
        assert!(c.liveness.initial_delay_seconds > c.readiness.initial_delay_seconds);
        assert!(c.liveness.period_seconds > c.readiness.period_seconds);
        assert_eq!(c.liveness.path, "/health");
        assert_eq!(desired.workload.replicas, 1);
    }

    #[test]
    fn content_hash_annotation_tracks_content_only() {
        let config = PlatformConfig::default();
        let builder = ResourceBuilder::new(&config);
        let key = "shipyard.dev/content-hash";

        let mut a = single();
        let before = builder.build(&a, String::new());
        a.name = "renamed".into();
        let renamed = builder.build(&a, String::new());
        assert_eq!(
            before.workload.template.annotations[key],
            renamed.workload.template.annotations[key]
        );

        a.deployed = AppContent::Single { code: "app = FastAPI() ".into() };
        let changed = builder.build(&a, String::new());
        assert_ne!(
            before.workload.template.annotations[key],
            changed.workload.template.annotations[key]
        );
    }

    #[test]
    fn routing_matches_subdomain_and_points_at_exposure() {
        let config = PlatformConfig::default();
        let desired = ResourceBuilder::new(&config).build(&single(), String::new());
        let route = &desired.routing.spec["routes"][0];
        assert_eq!(route["match"], "Host(`app-01hx.apps.localhost`)");
        assert_eq!(route["services"][0]["name"], desired.exposure.metadata.name.as_str());
        assert_eq!(route["services"][0]["port"], 80);
        assert_eq!(desired.exposure.ports[0].target_port, 8000);
    }

    #[test]
    fn labels_are_sanitized_and_selector_matches_pods() {
        let config = PlatformConfig::default();
        let builder = ResourceBuilder::new(&config);
        let desired = builder.build(&single(), String::new());
        assert_eq!(desired.code.metadata.labels["shipyard.dev/tenant"], "tenant-example.com");
        assert!(desired.workload.selector.matches(&desired.workload.template.labels));
        assert_eq!(desired.exposure.selector, desired.workload.selector);
    }

    #[test]
    fn deployment_url_uses_scheme_and_domain() {
        let config = PlatformConfig::default();
        assert_eq!(
            deployment_url(&AppId::parse("abc").unwrap(), &config),
            "https://app-abc.apps.localhost"
        );
    }

    #[rstest]
    #[case::reserved("DATABASE_URL")]
    #[case::port("PORT")]
    #[case::leading_digit("1KEY")]
    #[case::dash("MY-KEY")]
    fn rejects_bad_env_names(#[case] name: &str) {
        let env = BTreeMap::from([(name.to_string(), "v".to_string())]);
        assert!(matches!(check_env_vars(&env), Err(PlatformError::InvalidRequest(_))));
    }

    #[test]
    fn accepts_ordinary_env_names() {
        let env = BTreeMap::from([("_PRIVATE".to_string(), "1".to_string()), ("api_key2".to_string(), "2".to_string())]);
        assert!(check_env_vars(&env).is_ok());
    }
}
