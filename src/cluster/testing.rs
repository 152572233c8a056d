/// In-memory cluster controller for workflow tests
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::controller::ClusterController;
use super::defaults::infer_product;
use crate::api::{Cluster, Product};
use crate::error::{Error, Result};

type ErrorFactory = Box<dyn Fn() -> Error + Send + Sync>;

/// Keeps clusters in a map and records every call
#[derive(Default)]
pub struct FakeController {
    clusters: Mutex<BTreeMap<String, Cluster>>,
    gets: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
    applied: Mutex<Vec<Cluster>>,
    get_error: Option<ErrorFactory>,
    delete_error: Option<ErrorFactory>,
}

impl FakeController {
    pub fn with_clusters<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let clusters = names
            .into_iter()
            .map(|name| {
                let mut cluster = Cluster::named(name);
                cluster.product = infer_product(&cluster.name);
                (cluster.name.clone(), cluster)
            })
            .collect();
        Self {
            clusters: Mutex::new(clusters),
            ..Default::default()
        }
    }

    /// Add a cluster as declared, keeping its product
    pub fn with_cluster(self, cluster: Cluster) -> Self {
        self.clusters
            .lock()
            .unwrap()
            .insert(cluster.name.clone(), cluster);
        self
    }

    /// Fail every get with the given error
    pub fn failing_with(mut self, error: impl Fn() -> Error + Send + Sync + 'static) -> Self {
        self.get_error = Some(Box::new(error));
        self
    }

    /// Fail every delete with the given error
    pub fn failing_delete_with(
        mut self,
        error: impl Fn() -> Error + Send + Sync + 'static,
    ) -> Self {
        self.delete_error = Some(Box::new(error));
        self
    }

    pub fn gets(&self) -> Vec<String> {
        self.gets.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn applied(&self) -> Vec<Cluster> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterController for FakeController {
    async fn apply(&self, _ctx: &CancellationToken, desired: &Cluster) -> Result<Cluster> {
        self.applied.lock().unwrap().push(desired.clone());
        self.clusters
            .lock()
            .unwrap()
            .insert(desired.name.clone(), desired.clone());
        Ok(desired.clone())
    }

    /// Only clusters of the declared or inferred product are visible
    async fn get(
        &self,
        _ctx: &CancellationToken,
        name: &str,
        product: Option<Product>,
    ) -> Result<Cluster> {
        self.gets.lock().unwrap().push(name.to_string());
        if let Some(error) = &self.get_error {
            return Err(error());
        }
        let product = product.or_else(|| infer_product(name));
        self.clusters
            .lock()
            .unwrap()
            .get(name)
            .filter(|cluster| product.is_none() || cluster.product == product)
            .cloned()
            .ok_or_else(|| Error::cluster_not_found(name))
    }

    async fn list(&self, _ctx: &CancellationToken) -> Result<Vec<Cluster>> {
        Ok(self.clusters.lock().unwrap().values().cloned().collect())
    }

    async fn delete(
        &self,
        _ctx: &CancellationToken,
        name: &str,
        product: Option<Product>,
    ) -> Result<()> {
        if let Some(error) = &self.delete_error {
            return Err(error());
        }
        let product = product.or_else(|| infer_product(name));
        let mut clusters = self.clusters.lock().unwrap();
        if let Some(cluster) = clusters.get(name) {
            if product.is_some() && cluster.product != product {
                return Err(Error::cluster_not_found(name));
            }
        }
        self.deletes.lock().unwrap().push(name.to_string());
        clusters.remove(name);
        Ok(())
    }
}
