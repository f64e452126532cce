//! # Providers
//!
//! Domain clients the registry controllers delegate to:
//! - Image registries: Docker Registry HTTP API v2 login
//! - Model registries: Hugging Face hub and file/NFS-backed BentoML stores
//!
//! Clients use reqwest with rustls (no OpenSSL dependencies).

pub mod image_registry;
pub mod model_registry;

pub use image_registry::{ImageRegistryClient, RegistryAuth, RegistryV2Client};
pub use model_registry::{
    DefaultModelRegistryFactory, ModelRegistryClient, ModelRegistryFactory,
};
