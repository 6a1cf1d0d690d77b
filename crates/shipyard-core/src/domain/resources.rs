//! Resources - 1 app 分の望ましいクラスタリソース
//!
//! 種類は 4 つで、適用順は常に code bundle → workload → exposure → routing rule。
//! routing rule は group/version/kind で指定する汎用リソースで、spec は自由形式の JSON です。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    CodeBundle,
    Workload,
    Exposure,
    RoutingRule,
}

impl ResourceKind {
    /// Creation order. The workload mounts the code bundle, so it must come after it.
    pub const APPLY_ORDER: [ResourceKind; 4] = [
        ResourceKind::CodeBundle,
        ResourceKind::Workload,
        ResourceKind::Exposure,
        ResourceKind::RoutingRule,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::CodeBundle => "code-bundle",
            ResourceKind::Workload => "workload",
            ResourceKind::Exposure => "exposure",
            ResourceKind::RoutingRule => "routing-rule",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Equality-based label selector (`k1=v1,k2=v2`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector(pub BTreeMap<String, String>);

impl LabelSelector {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|(k, v)| labels.get(k) == Some(v))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        f.write_str(&parts.join(","))
    }
}

/// Holds the app source, one key per file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBundle {
    pub metadata: ObjectMeta,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuantities {
    pub cpu: String,
    pub memory: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub requests: ResourceQuantities,
    pub limits: ResourceQuantities,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpProbe {
    pub path: String,
    pub port: u16,
    pub initial_delay_seconds: u32,
    pub period_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Name of the code bundle mounted here.
    pub source: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    pub port: u16,
    pub env: Vec<EnvVar>,
    pub resources: ResourceRequirements,
    pub liveness: HttpProbe,
    pub readiness: HttpProbe,
    pub mounts: Vec<VolumeMount>,
}

/// Pod template. Changing anything in here restarts the pods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodTemplate {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub container: Container,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub metadata: ObjectMeta,
    pub replicas: u32,
    pub selector: LabelSelector,
    pub template: PodTemplate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub port: u16,
    pub target_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exposure {
    pub metadata: ObjectMeta,
    pub selector: LabelSelector,
    pub ports: Vec<PortMapping>,
}

/// Generic resource addressed by group/version/kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub metadata: ObjectMeta,
    pub api_version: String,
    pub kind: String,
    pub spec: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resource")]
pub enum Resource {
    CodeBundle(CodeBundle),
    Workload(Workload),
    Exposure(Exposure),
    RoutingRule(RoutingRule),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::CodeBundle(_) => ResourceKind::CodeBundle,
            Resource::Workload(_) => ResourceKind::Workload,
            Resource::Exposure(_) => ResourceKind::Exposure,
            Resource::RoutingRule(_) => ResourceKind::RoutingRule,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Resource::CodeBundle(r) => &r.metadata,
            Resource::Workload(r) => &r.metadata,
            Resource::Exposure(r) => &r.metadata,
            Resource::RoutingRule(r) => &r.metadata,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata().name
    }
}

/// The full desired set for one app, kept in apply order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredResources {
    pub code: CodeBundle,
    pub workload: Workload,
    pub exposure: Exposure,
    pub routing: RoutingRule,
}

impl DesiredResources {
    /// Resources in creation order.
    pub fn in_apply_order(&self) -> [Resource; 4] {
        [
            Resource::CodeBundle(self.code.clone()),
            Resource::Workload(self.workload.clone()),
            Resource::Exposure(self.exposure.clone()),
            Resource::RoutingRule(self.routing.clone()),
        ]
    }
}
