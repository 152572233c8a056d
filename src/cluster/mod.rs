/// Cluster lifecycle: defaulting, backend admins, controller and name normalization
pub mod admin;
pub mod colima;
pub mod controller;
pub mod defaults;
pub mod k3d;
pub mod kind;
pub mod minikube;
pub mod normalize;

#[cfg(test)]
pub mod testing;

pub use admin::DockerConfigWriter;
pub use controller::{ClusterController, Controller};
pub use defaults::fill_defaults;
pub use normalize::normalized_get;
