//! 查询参数解析。
//!
//! 原始查询值只有三种形态：缺失、单个字符串、重复键形成的字符串列表。
//! 所有解析器在此边界完成类型与取值校验，之后的流水线只接触已校验的
//! 类型化配置（见 [`QueryParams`]）。

use std::collections::HashMap;

use crate::error::AppError;
use crate::features::random::models::{Font, Format};

/// 单个查询键的原始取值
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    One(String),
    Many(Vec<String>),
}

/// 原始查询映射，由 `Query<Vec<(String, String)>>` 聚合而来。
#[derive(Debug, Default)]
pub struct RawQuery(HashMap<String, RawValue>);

impl RawQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut map = HashMap::<String, RawValue>::new();
        for (key, value) in pairs {
            match map.entry(key) {
                std::collections::hash_map::Entry::Vacant(e) => {
                    e.insert(RawValue::One(value));
                }
                std::collections::hash_map::Entry::Occupied(mut e) => match e.get_mut() {
                    RawValue::One(first) => {
                        let first = std::mem::take(first);
                        *e.get_mut() = RawValue::Many(vec![first, value]);
                    }
                    RawValue::Many(list) => list.push(value),
                },
            }
        }
        RawQuery(map)
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.0.get(name)
    }
}

/// 取出单字符串形态；列表形态按给定错误信息报错，缺失按 allow_missing 处理。
fn parse_base_string<'a>(
    value: Option<&'a RawValue>,
    name: &str,
    error_string: &str,
    allow_missing: bool,
) -> Result<Option<&'a str>, AppError> {
    match value {
        None => {
            if !allow_missing {
                return Err(AppError::MissingParameter(name.to_string()));
            }
            Ok(None)
        }
        Some(RawValue::One(s)) => Ok(Some(s.as_str())),
        Some(RawValue::Many(_)) => Err(AppError::InvalidParameter(error_string.to_string())),
    }
}

pub fn parse_string(
    value: Option<&RawValue>,
    name: &str,
    allow_missing: bool,
) -> Result<Option<String>, AppError> {
    let error_string = format!("Query parameter {name} must be a string");
    Ok(parse_base_string(value, name, &error_string, allow_missing)?.map(str::to_string))
}

/// 数字解析要求浮点解析结果严格往返：格式化后必须还原输入字符串。
/// 这样可以拒绝 `12abc` 这类部分解析，也拒绝 `5.0` 等非规范写法。
pub fn parse_number(
    value: Option<&RawValue>,
    name: &str,
    allow_missing: bool,
) -> Result<Option<f64>, AppError> {
    let error_string = format!("Query parameter {name} must be a number");
    let Some(raw) = parse_base_string(value, name, &error_string, allow_missing)? else {
        return Ok(None);
    };
    let parsed: f64 = raw
        .parse()
        .map_err(|_| AppError::InvalidParameter(format!("Query parameter {name} must be a valid number")))?;
    if !parsed.is_finite() || format!("{parsed}") != raw {
        return Err(AppError::InvalidParameter(format!(
            "Query parameter {name} must be a valid number"
        )));
    }
    Ok(Some(parsed))
}

/// 布尔参数：只要出现即为 true，唯一的例外是字面量 "false"。
pub fn parse_boolean(
    value: Option<&RawValue>,
    name: &str,
    allow_missing: bool,
) -> Result<Option<bool>, AppError> {
    let error_string = format!("Query parameter {name} must be a boolean");
    let Some(raw) = parse_base_string(value, name, &error_string, allow_missing)? else {
        return Ok(None);
    };
    Ok(Some(raw != "false"))
}

pub fn parse_string_list(
    value: Option<&RawValue>,
    name: &str,
    allow_missing: bool,
) -> Result<Option<Vec<String>>, AppError> {
    match value {
        None => {
            if !allow_missing {
                return Err(AppError::MissingParameter(name.to_string()));
            }
            Ok(None)
        }
        Some(RawValue::One(s)) => Ok(Some(vec![s.clone()])),
        Some(RawValue::Many(list)) => Ok(Some(list.clone())),
    }
}

/// 闭合枚举解析。`lookup` 为 wire 名到枚举值的精确（大小写敏感）映射，
/// `allowed` 用于拼接错误提示。
pub fn parse_enum<T>(
    value: Option<&RawValue>,
    name: &str,
    allow_missing: bool,
    allowed: &[&str],
    lookup: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, AppError> {
    let error_string = format!(
        "Query parameter {name} must be one of {}",
        allowed.join(", ")
    );
    let Some(raw) = parse_base_string(value, name, &error_string, allow_missing)? else {
        return Ok(None);
    };
    match lookup(raw) {
        Some(v) => Ok(Some(v)),
        None => Err(AppError::InvalidParameter(error_string)),
    }
}

/// 人类可读时长解析为毫秒数，支持多段相加（如 "1h 30m"）。
pub fn parse_duration(
    value: Option<&RawValue>,
    name: &str,
    allow_missing: bool,
) -> Result<Option<i64>, AppError> {
    let error_string = format!("Query parameter {name} must be a duration, eg. 1sec, 10min or 1d");
    let Some(raw) = parse_base_string(value, name, &error_string, allow_missing)? else {
        return Ok(None);
    };
    match parse_duration_millis(raw) {
        Some(ms) => Ok(Some(ms)),
        None => Err(AppError::InvalidParameter(error_string)),
    }
}

/// 时长文法：`若干段 (数字 [单位])`，段间允许空白或逗号，无单位默认毫秒。
/// 支持单位：ms、s/sec、m/min、h/hour、d/day、w/week 及其常见复数别名。
pub fn parse_duration_millis(input: &str) -> Option<i64> {
    let mut chars = input.char_indices().peekable();
    let mut total = 0f64;
    let mut seen_term = false;

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() || c == ',' {
            chars.next();
            continue;
        }

        // 数字段（允许小数）
        if !(c.is_ascii_digit() || c == '.') {
            return None;
        }
        let mut end = start;
        while let Some(&(i, c)) = chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                end = i + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let amount: f64 = input[start..end].parse().ok()?;

        // 可选单位段
        let unit_start = chars.peek().map(|&(i, _)| i);
        let mut unit_end = unit_start;
        while let Some(&(i, c)) = chars.peek() {
            if c.is_ascii_alphabetic() {
                unit_end = Some(i + c.len_utf8());
                chars.next();
            } else {
                break;
            }
        }
        let unit = match (unit_start, unit_end) {
            (Some(s), Some(e)) if e > s => &input[s..e],
            _ => "ms",
        };

        let factor = unit_to_millis(unit)?;
        total += amount * factor;
        seen_term = true;
    }

    if !seen_term || !total.is_finite() {
        return None;
    }
    Some(total.round() as i64)
}

fn unit_to_millis(unit: &str) -> Option<f64> {
    let ms = match unit.to_ascii_lowercase().as_str() {
        "ms" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        "w" | "wk" | "week" | "weeks" => 604_800_000.0,
        _ => return None,
    };
    Some(ms)
}

/// 调用方关心的键列表。未列出的键不解析、不赋默认值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKey {
    Min,
    Max,
    Width,
    Height,
    ShowUpdatedDate,
    ClearCache,
    Font,
    Format,
    FontColor,
    BgColor,
    Items,
    Delimiter,
    CacheTime,
}

/// 类型化、已赋默认值的查询参数。仅请求键列表中的字段会被填充。
#[derive(Debug, Default, Clone)]
pub struct QueryParams {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub show_updated_date: Option<bool>,
    pub clear_cache: Option<bool>,
    pub font: Option<Font>,
    pub format: Option<Format>,
    pub font_color: Option<String>,
    pub bg_color: Option<String>,
    pub items: Option<Vec<String>>,
    pub delimiter: Option<String>,
    pub cache_time: Option<i64>,
}

/// 像素尺寸解析：在数字校验之上要求取值为正，向下取整到像素。
fn parse_dimension(
    raw: &RawQuery,
    name: &str,
) -> Result<Option<u32>, AppError> {
    let Some(value) = parse_number(raw.get(name), name, true)? else {
        return Ok(None);
    };
    if value < 1.0 || value > 10_000.0 {
        return Err(AppError::InvalidParameter(format!(
            "Query parameter {name} must be between 1 and 10000"
        )));
    }
    Ok(Some(value as u32))
}

/// 按键列表解析并赋默认值。
///
/// 默认规则：min=0，max=min+10，width=500，height 继承 width，
/// font=Roboto，format=png，fontColor=#333，bgColor=#fff，delimiter=", "。
/// `items` 在被请求时为必填；`imageFormat` 为 `format` 的别名（format 优先）。
pub fn parse_query_params(raw: &RawQuery, keys: &[ParamKey]) -> Result<QueryParams, AppError> {
    let wants = |k: ParamKey| keys.contains(&k);
    let mut params = QueryParams::default();

    if wants(ParamKey::Min) {
        let min = parse_number(raw.get("min"), "min", true)?.unwrap_or(0.0);
        params.min = Some(min.floor() as i64);
    }
    if wants(ParamKey::Max) {
        let max = match parse_number(raw.get("max"), "max", true)? {
            Some(v) => v.floor() as i64,
            None => params.min.unwrap_or(0) + 10,
        };
        params.max = Some(max);
    }
    if wants(ParamKey::Width) {
        params.width = Some(parse_dimension(raw, "width")?.unwrap_or(500));
    }
    if wants(ParamKey::Height) {
        // height 默认继承 width（选定的链式规则）
        let fallback = params.width.unwrap_or(500);
        params.height = Some(parse_dimension(raw, "height")?.unwrap_or(fallback));
    }
    if wants(ParamKey::ShowUpdatedDate) {
        params.show_updated_date =
            Some(parse_boolean(raw.get("showUpdatedDate"), "showUpdatedDate", true)?.unwrap_or(false));
    }
    if wants(ParamKey::ClearCache) {
        params.clear_cache =
            Some(parse_boolean(raw.get("clearCache"), "clearCache", true)?.unwrap_or(false));
    }
    if wants(ParamKey::Font) {
        let font = parse_enum(
            raw.get("font"),
            "font",
            true,
            &Font::ALLOWED.map(|f| f.as_str()),
            Font::from_query_value,
        )?;
        params.font = Some(font.unwrap_or(Font::Roboto));
    }
    if wants(ParamKey::Format) {
        let allowed = Format::ALLOWED.map(|f| f.as_str());
        let format = match parse_enum(
            raw.get("format"),
            "format",
            true,
            &allowed,
            Format::from_query_value,
        )? {
            Some(f) => Some(f),
            // 历史别名
            None => parse_enum(
                raw.get("imageFormat"),
                "imageFormat",
                true,
                &allowed,
                Format::from_query_value,
            )?,
        };
        params.format = Some(format.unwrap_or(Format::Png));
    }
    if wants(ParamKey::FontColor) {
        params.font_color =
            Some(parse_string(raw.get("fontColor"), "fontColor", true)?.unwrap_or_else(|| "#333".to_string()));
    }
    if wants(ParamKey::BgColor) {
        params.bg_color =
            Some(parse_string(raw.get("bgColor"), "bgColor", true)?.unwrap_or_else(|| "#fff".to_string()));
    }
    if wants(ParamKey::Items) {
        let items = parse_string_list(raw.get("items"), "items", false)?.unwrap_or_default();
        if items.is_empty() || items.iter().all(|s| s.is_empty()) {
            return Err(AppError::InvalidParameter(
                "Query parameter items must not be empty".to_string(),
            ));
        }
        params.items = Some(items);
    }
    if wants(ParamKey::Delimiter) {
        params.delimiter =
            Some(parse_string(raw.get("delimiter"), "delimiter", true)?.unwrap_or_else(|| ", ".to_string()));
    }
    if wants(ParamKey::CacheTime) {
        params.cache_time = parse_duration(raw.get("cacheTime"), "cacheTime", true)?;
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawQuery {
        RawQuery::from_pairs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn repeated_keys_aggregate_into_lists() {
        let q = raw(&[("items", "a"), ("items", "b"), ("min", "1")]);
        assert_eq!(
            q.get("items"),
            Some(&RawValue::Many(vec!["a".into(), "b".into()]))
        );
        assert_eq!(q.get("min"), Some(&RawValue::One("1".into())));
        assert_eq!(q.get("absent"), None);
    }

    #[test]
    fn number_rejects_partial_parses() {
        let q = raw(&[("width", "12abc")]);
        let err = parse_number(q.get("width"), "width", true).unwrap_err();
        assert!(err.to_string().contains("width"));
    }

    #[test]
    fn number_requires_exact_round_trip() {
        // "5.0" 解析为 5 后格式化为 "5"，不等于输入，按非法处理
        let q = raw(&[("min", "5.0")]);
        assert!(parse_number(q.get("min"), "min", true).is_err());

        let q = raw(&[("min", "5"), ("max", "0.5")]);
        assert_eq!(parse_number(q.get("min"), "min", true).unwrap(), Some(5.0));
        assert_eq!(parse_number(q.get("max"), "max", true).unwrap(), Some(0.5));
    }

    #[test]
    fn missing_required_parameter_is_its_own_error() {
        let q = raw(&[]);
        let err = parse_string_list(q.get("items"), "items", false).unwrap_err();
        assert!(matches!(err, AppError::MissingParameter(ref name) if name == "items"));
    }

    #[test]
    fn boolean_is_true_unless_literal_false() {
        let q = raw(&[("a", "false"), ("b", "0"), ("c", "")]);
        assert_eq!(parse_boolean(q.get("a"), "a", true).unwrap(), Some(false));
        assert_eq!(parse_boolean(q.get("b"), "b", true).unwrap(), Some(true));
        assert_eq!(parse_boolean(q.get("c"), "c", true).unwrap(), Some(true));
        assert_eq!(parse_boolean(q.get("d"), "d", true).unwrap(), None);
    }

    #[test]
    fn single_item_becomes_one_element_list() {
        let q = raw(&[("items", "only")]);
        assert_eq!(
            parse_string_list(q.get("items"), "items", false).unwrap(),
            Some(vec!["only".to_string()])
        );
    }

    #[test]
    fn enum_error_enumerates_allowed_values() {
        let q = raw(&[("format", "gif")]);
        let err = parse_enum(
            q.get("format"),
            "format",
            true,
            &Format::ALLOWED.map(|f| f.as_str()),
            Format::from_query_value,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("json") && msg.contains("svg") && msg.contains("png") && msg.contains("jpeg"));
    }

    #[test]
    fn duration_grammar_covers_all_units() {
        assert_eq!(parse_duration_millis("250ms"), Some(250));
        assert_eq!(parse_duration_millis("1sec"), Some(1_000));
        assert_eq!(parse_duration_millis("10min"), Some(600_000));
        assert_eq!(parse_duration_millis("2h"), Some(7_200_000));
        assert_eq!(parse_duration_millis("1d"), Some(86_400_000));
        assert_eq!(parse_duration_millis("1w"), Some(604_800_000));
        assert_eq!(parse_duration_millis("500"), Some(500));
        assert_eq!(parse_duration_millis("1h 30m"), Some(5_400_000));
        assert_eq!(parse_duration_millis("1.5s"), Some(1_500));
    }

    #[test]
    fn duration_rejects_garbage() {
        assert_eq!(parse_duration_millis(""), None);
        assert_eq!(parse_duration_millis("soon"), None);
        assert_eq!(parse_duration_millis("10 parsecs"), None);
        assert_eq!(parse_duration_millis("h1"), None);
    }

    #[test]
    fn defaults_apply_only_to_requested_keys() {
        let q = raw(&[]);
        let params = parse_query_params(&q, &[ParamKey::Min, ParamKey::Max, ParamKey::Width]).unwrap();
        assert_eq!(params.min, Some(0));
        assert_eq!(params.max, Some(10));
        assert_eq!(params.width, Some(500));
        // 未请求的键保持 None
        assert_eq!(params.height, None);
        assert_eq!(params.font, None);
    }

    #[test]
    fn max_default_chains_from_explicit_min() {
        let q = raw(&[("min", "42")]);
        let params = parse_query_params(&q, &[ParamKey::Min, ParamKey::Max]).unwrap();
        assert_eq!(params.min, Some(42));
        assert_eq!(params.max, Some(52));
    }

    #[test]
    fn height_default_chains_from_width() {
        let q = raw(&[("width", "800")]);
        let params = parse_query_params(&q, &[ParamKey::Width, ParamKey::Height]).unwrap();
        assert_eq!(params.height, Some(800));

        let q = raw(&[("width", "800"), ("height", "200")]);
        let params = parse_query_params(&q, &[ParamKey::Width, ParamKey::Height]).unwrap();
        assert_eq!(params.height, Some(200));
    }

    #[test]
    fn image_format_alias_is_accepted_but_format_wins() {
        let q = raw(&[("imageFormat", "svg")]);
        let params = parse_query_params(&q, &[ParamKey::Format]).unwrap();
        assert_eq!(params.format, Some(Format::Svg));

        let q = raw(&[("format", "jpeg"), ("imageFormat", "svg")]);
        let params = parse_query_params(&q, &[ParamKey::Format]).unwrap();
        assert_eq!(params.format, Some(Format::Jpeg));
    }

    #[test]
    fn dimension_bounds_are_enforced() {
        let q = raw(&[("width", "0")]);
        assert!(parse_query_params(&q, &[ParamKey::Width]).is_err());
        let q = raw(&[("width", "-5")]);
        assert!(parse_query_params(&q, &[ParamKey::Width]).is_err());
    }
}
