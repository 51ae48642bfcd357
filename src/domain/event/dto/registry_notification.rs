use serde::Deserialize;
use validator::Validate;

/// Notification envelope POSTed by a Docker Distribution registry.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryNotification {
    pub events: Vec<RegistryEventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryEventRecord {
    pub action: String,

    pub target: RegistryTarget,

    #[serde(default)]
    pub request: Option<RegistryRequest>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegistryTarget {
    #[serde(default)]
    pub media_type: Option<String>,

    #[serde(default)]
    pub digest: Option<String>,

    #[validate(length(min = 1))]
    pub repository: String,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryRequest {
    #[serde(default)]
    pub host: Option<String>,
}
