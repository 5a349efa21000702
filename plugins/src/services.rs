//! ServicesFactory 实现：为给定的 store 构建无界面渲染面与调度器，供 CLI 复用。
use async_trait::async_trait;
use mapstate_core::api::{AppConfig, Services, ServicesFactory, StateStore};

use crate::factory;
use crate::surface::HeadlessSurface;

#[derive(Default)]
pub struct PluginServicesFactory;

#[async_trait]
impl ServicesFactory for PluginServicesFactory {
    async fn build_services(&self, cfg: &AppConfig, store: &StateStore) -> anyhow::Result<Services> {
        let surface = HeadlessSurface::new(store.clone());
        Ok(factory::build_services(cfg, &surface))
    }
}
