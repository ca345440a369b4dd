//! ConfigMap-backed store
//!
//! One ConfigMap holds all per-cluster values in its data map. The backing
//! record is materialized on first write.

use super::{Store, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Default name of the backing ConfigMap
pub const DEFAULT_CONFIG_MAP: &str = "kubeapply-store";

pub struct ConfigMapStore {
    api: Api<ConfigMap>,
    name: String,
}

impl ConfigMapStore {
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
        }
    }

    async fn patch_value(&self, key: &str, value: &str) -> Result<(), kube::Error> {
        let patch = serde_json::json!({ "data": { key: value } });
        self.api
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn create_with(&self, key: &str, value: &str) -> Result<(), kube::Error> {
        let mut data = BTreeMap::new();
        data.insert(key.to_string(), value.to_string());

        let config_map = ConfigMap {
            metadata: kube::api::ObjectMeta {
                name: Some(self.name.clone()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };

        self.api.create(&PostParams::default(), &config_map).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for ConfigMapStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.api.get(&self.name).await {
            Ok(config_map) => Ok(config_map.data.and_then(|d| d.get(key).cloned())),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
            Err(source) => Err(StoreError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let wrap = |source: kube::Error| StoreError::Write {
            key: key.to_string(),
            source,
        };

        match self.patch_value(key, value).await {
            Ok(()) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                info!(config_map = %self.name, "Creating store record");
                match self.create_with(key, value).await {
                    Ok(()) => Ok(()),
                    // Lost the creation race; the record exists now, so the
                    // patch applies (last writer wins)
                    Err(kube::Error::Api(api_err)) if api_err.code == 409 => {
                        debug!(config_map = %self.name, "Store record created concurrently");
                        self.patch_value(key, value).await.map_err(wrap)
                    }
                    Err(e) => Err(wrap(e)),
                }
            }
            Err(e) => Err(wrap(e)),
        }
    }
}
