use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::Platform;
use super::errors::RegistryError;

/// URL 匹配规则，必须是纯函数
pub type UrlMatcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;
/// 每次解析都会调用工厂创建一个适配器实例
pub type PlatformFactory = Arc<dyn Fn() -> Arc<dyn Platform> + Send + Sync>;

struct PlatformBinding {
    name: String,
    matcher: UrlMatcher,
    factory: PlatformFactory,
}

/// 平台注册表
///
/// 按注册顺序保存 (名称, 匹配规则, 工厂)，解析时取第一个匹配的绑定。
/// 注册只能追加，同名重复注册会报错而不是覆盖，所以更具体的规则要先注册。
/// 注册完成后用 `Arc` 共享给各个组件，解析只读不需要加锁。
#[derive(Default)]
pub struct PlatformRegistry {
    bindings: Vec<PlatformBinding>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M, F>(
        &mut self,
        name: impl Into<String>,
        matcher: M,
        factory: F,
    ) -> Result<(), RegistryError>
    where
        M: Fn(&str) -> bool + Send + Sync + 'static,
        F: Fn() -> Arc<dyn Platform> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.contains(&name) {
            return Err(RegistryError::DuplicatePlatform(name));
        }

        debug!("注册平台: {}", name);
        self.bindings.push(PlatformBinding {
            name,
            matcher: Arc::new(matcher),
            factory: Arc::new(factory),
        });
        Ok(())
    }

    /// 注册一个现成的适配器实例，匹配规则用它自己的 `supports`
    pub fn register_platform(&mut self, platform: Arc<dyn Platform>) -> Result<(), RegistryError> {
        let name = platform.name().to_string();
        let matcher_platform = Arc::clone(&platform);
        self.register(
            name,
            move |url| matcher_platform.supports(url),
            move || Arc::clone(&platform),
        )
    }

    // 解析URL，返回第一个匹配平台创建的适配器
    pub fn resolve(&self, url: &str) -> Option<Arc<dyn Platform>> {
        self.binding_for(url).map(|binding| (binding.factory)())
    }

    pub fn platform_for(&self, url: &str) -> Option<&str> {
        self.binding_for(url).map(|binding| binding.name.as_str())
    }

    pub fn is_supported(&self, url: &str) -> bool {
        self.binding_for(url).is_some()
    }

    /// 按名称创建适配器（不区分大小写），用于热门列表之类不以URL为入口的调用
    pub fn create(&self, name: &str) -> Option<Arc<dyn Platform>> {
        self.bindings
            .iter()
            .find(|binding| binding.name.eq_ignore_ascii_case(name))
            .map(|binding| (binding.factory)())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.iter().any(|binding| binding.name == name)
    }

    /// 已注册的平台名称，按注册顺序
    pub fn platform_names(&self) -> Vec<String> {
        self.bindings.iter().map(|b| b.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn binding_for(&self, url: &str) -> Option<&PlatformBinding> {
        self.bindings.iter().find(|binding| (binding.matcher)(url))
    }
}

impl fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformRegistry")
            .field("platforms", &self.platform_names())
            .finish()
    }
}
