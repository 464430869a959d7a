use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::ser::SerializeMap;

/// 输出格式（闭合枚举，查询参数与 Content-Type 头共用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, utoipa::ToSchema)]
pub enum Format {
    Json,
    Svg,
    Png,
    Jpeg,
}

impl Format {
    /// 查询参数取值全集，校验失败时用于错误提示。
    pub const ALLOWED: [Format; 4] = [Format::Json, Format::Svg, Format::Png, Format::Jpeg];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Svg => "svg",
            Format::Png => "png",
            Format::Jpeg => "jpeg",
        }
    }

    pub fn from_query_value(value: &str) -> Option<Format> {
        // 闭合集合，大小写敏感
        Self::ALLOWED.into_iter().find(|f| f.as_str() == value)
    }

    /// 响应 Content-Type。与 `from_content_type` 互为逆映射。
    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Svg => "image/svg",
            Format::Png => "image/png",
            Format::Jpeg => "image/jpeg",
        }
    }

    /// 从请求 Content-Type 头解析格式，未识别的值返回 None（忽略，不报错）。
    pub fn from_content_type(header: &str) -> Option<Format> {
        match header {
            "application/json" => Some(Format::Json),
            "image/svg" => Some(Format::Svg),
            "image/png" => Some(Format::Png),
            "image/jpeg" => Some(Format::Jpeg),
            _ => None,
        }
    }
}

/// 解析最终输出格式：识别的 Content-Type 头优先，其次查询参数，默认 PNG。
pub fn resolve_format(query_format: Option<Format>, content_type: Option<&str>) -> Format {
    content_type
        .and_then(Format::from_content_type)
        .or(query_format)
        .unwrap_or(Format::Png)
}

/// 支持的字体（闭合枚举，wire 表示为字体族名）
#[derive(Debug, Clone, Copy, PartialEq, Eq, utoipa::ToSchema)]
pub enum Font {
    Roboto,
    RobotoSerif,
    RobotoMono,
    RobotoSlab,
}

impl Font {
    pub const ALLOWED: [Font; 4] = [
        Font::Roboto,
        Font::RobotoSerif,
        Font::RobotoMono,
        Font::RobotoSlab,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Font::Roboto => "Roboto",
            Font::RobotoSerif => "Roboto Serif",
            Font::RobotoMono => "Roboto Mono",
            Font::RobotoSlab => "Roboto Slab",
        }
    }

    pub fn from_query_value(value: &str) -> Option<Font> {
        Self::ALLOWED.into_iter().find(|f| f.as_str() == value)
    }
}

/// 端点种类，仅驱动取值生成与响应字段名两处分支。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Number,
    ListItem,
    ListOrder,
}

impl EndpointKind {
    /// JSON 响应中承载随机值的字段名
    pub fn value_field(&self) -> &'static str {
        match self {
            EndpointKind::Number => "number",
            EndpointKind::ListItem => "item",
            EndpointKind::ListOrder => "items",
        }
    }
}

/// 随机值本体
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RandomValue {
    Number(i64),
    Item(String),
    Order(Vec<String>),
}

impl RandomValue {
    /// 渲染进图片模板的文本表示。`delimiter` 仅对乱序列表生效。
    pub fn display_text(&self, delimiter: &str) -> String {
        match self {
            RandomValue::Number(n) => n.to_string(),
            RandomValue::Item(s) => s.clone(),
            RandomValue::Order(items) => items.join(delimiter),
        }
    }
}

/// 展示用时间戳格式，与接口历史行为保持一致（dd.MM.yyyy HH:mm:ss）。
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%d.%m.%Y %H:%M:%S").to_string()
}

/// 一次缓存窗口内生成的随机结果，生成后不再变更，过期时整体替换。
#[derive(Debug, Clone, PartialEq)]
pub struct RandomResult {
    pub kind: EndpointKind,
    pub value: RandomValue,
    /// 生成时刻（展示格式）
    pub updated_date: String,
    /// 缓存过期时刻（展示格式），无缓存时缺省
    pub cache_expires: Option<String>,
}

impl Serialize for RandomResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // 字段顺序固定，保证同一缓存窗口内响应字节级一致。
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("success", &true)?;
        map.serialize_entry(self.kind.value_field(), &self.value)?;
        map.serialize_entry("updatedDate", &self.updated_date)?;
        if let Some(expires) = &self.cache_expires {
            map.serialize_entry("cacheExpires", expires)?;
        }
        map.end()
    }
}

/// 渲染输入，由请求配置与随机结果拼装，构造后不可变。
#[derive(Debug, Clone)]
pub struct ImageSpec {
    /// 已按 delimiter 拼接的展示文本
    pub value: String,
    pub width: u32,
    pub height: u32,
    pub font: Font,
    pub font_color: String,
    pub bg_color: String,
    pub show_updated_date: bool,
    pub updated_date: String,
}
