use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

/// 资源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// 资源基础路径
    pub base_path: String,
    /// 字体文件夹名（相对 base_path）
    #[serde(default = "ResourcesConfig::default_fonts_folder")]
    pub fonts_folder: String,
    /// SVG 模板文件夹名（相对 base_path）
    #[serde(default = "ResourcesConfig::default_templates_folder")]
    pub templates_folder: String,
    /// 静态文件文件夹名（相对 base_path）
    #[serde(default = "ResourcesConfig::default_public_folder")]
    pub public_folder: String,
}

impl ResourcesConfig {
    fn default_fonts_folder() -> String {
        "fonts".to_string()
    }
    fn default_templates_folder() -> String {
        "templates".to_string()
    }
    fn default_public_folder() -> String {
        "public".to_string()
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
}

/// 会话配置
///
/// 会话只承载三类端点各自的缓存结果与过期时间，
/// 生命周期由 cookie 与存储 TTL 共同限定（上限 24 小时）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 会话 cookie 名
    #[serde(default = "SessionConfig::default_cookie_name")]
    pub cookie_name: String,
    /// 会话最大寿命（秒），兼作 cookie Max-Age 与存储 TTL
    #[serde(default = "SessionConfig::default_max_age_secs")]
    pub max_age_secs: u64,
}

impl SessionConfig {
    fn default_cookie_name() -> String {
        "rng-backend-session".to_string()
    }
    fn default_max_age_secs() -> u64 {
        24 * 60 * 60
    }

    pub fn max_age_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.max_age_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: Self::default_cookie_name(),
            max_age_secs: Self::default_max_age_secs(),
        }
    }
}

/// 图片渲染配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRenderConfig {
    /// 栅格化 DPI
    #[serde(default = "ImageRenderConfig::default_dpi")]
    pub dpi: u32,
    /// 字体目录缺字时是否回退加载系统字体
    #[serde(default = "ImageRenderConfig::default_load_system_fonts")]
    pub load_system_fonts: bool,
    /// 默认字体族（模板未指定时使用）
    #[serde(default = "ImageRenderConfig::default_font_family")]
    pub default_font_family: String,
    /// JPEG 质量 1-100
    #[serde(default = "ImageRenderConfig::default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// 渲染速度优先（牺牲部分画质与压缩率）
    #[serde(default)]
    pub optimize_speed: bool,
}

impl ImageRenderConfig {
    fn default_dpi() -> u32 {
        1000
    }
    fn default_load_system_fonts() -> bool {
        true
    }
    fn default_font_family() -> String {
        "Roboto Mono".to_string()
    }
    fn default_jpeg_quality() -> u8 {
        85
    }
}

impl Default for ImageRenderConfig {
    fn default() -> Self {
        Self {
            dpi: Self::default_dpi(),
            load_system_fonts: Self::default_load_system_fonts(),
            default_font_family: Self::default_font_family(),
            jpeg_quality: Self::default_jpeg_quality(),
            optimize_speed: false,
        }
    }
}

/// CORS 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// 是否启用 CORS
    #[serde(default)]
    pub enabled: bool,
    /// 允许的 Origin 列表（支持 "*" 表示任意）
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// 允许的方法列表（支持 "*" 表示任意）
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    /// 允许的请求头列表（支持 "*" 表示任意）
    #[serde(default)]
    pub allowed_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: Vec::new(),
            allowed_methods: Vec::new(),
            allowed_headers: Vec::new(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub resources: ResourcesConfig,
    pub logging: LoggingConfig,
    /// 会话配置
    #[serde(default)]
    pub session: SessionConfig,
    /// 图片渲染配置
    #[serde(default)]
    pub image: ImageRenderConfig,
    /// CORS 配置
    #[serde(default)]
    pub cors: CorsConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        tracing::info!("正在从 {:?} 加载配置文件", config_path);

        let builder = ConfigBuilder::builder()
            // 加载配置文件
            .add_source(File::with_name(config_path.to_str().unwrap()))
            // 支持环境变量覆盖，例如：APP_SERVER_PORT
            .add_source(
                Environment::with_prefix("APP")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        builder.try_deserialize()
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 初始化全局配置（已初始化时直接复用，供测试使用）
    pub fn ensure_global() -> &'static AppConfig {
        if CONFIG.get().is_none() {
            // 并发初始化时允许 set 失败
            let _ = Self::init_global();
        }
        Self::global()
    }

    /// 获取配置文件路径
    fn get_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 获取资源文件夹路径
    pub fn resources_path(&self) -> PathBuf {
        PathBuf::from(&self.resources.base_path)
    }

    /// 获取字体目录完整路径
    pub fn fonts_path(&self) -> PathBuf {
        self.resources_path().join(&self.resources.fonts_folder)
    }

    /// 获取 SVG 模板目录完整路径
    pub fn templates_path(&self) -> PathBuf {
        self.resources_path().join(&self.resources.templates_folder)
    }

    /// 获取静态文件目录完整路径
    pub fn public_path(&self) -> PathBuf {
        self.resources_path().join(&self.resources.public_folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_defaults_cap_at_24_hours() {
        let s = SessionConfig::default();
        assert_eq!(s.max_age_secs, 86_400);
        assert!(!s.cookie_name.is_empty());
    }

    #[test]
    fn image_render_defaults_match_rasterizer_contract() {
        let img = ImageRenderConfig::default();
        assert_eq!(img.dpi, 1000);
        assert!((1..=100).contains(&img.jpeg_quality));
    }

    #[test]
    fn config_file_in_repo_is_loadable() {
        let cfg = AppConfig::load().expect("config.toml 应可解析");
        assert!(cfg.server.port > 0);
        assert!(cfg.templates_path().ends_with("templates"));
    }
}
