use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsConfig;

/// 根据配置构建 CORS 中间件
pub fn build_cors_layer(cors: &CorsConfig) -> Option<CorsLayer> {
    if !cors.enabled {
        return None;
    }

    let (any_origin, origins) = parse_allowed_origins(&cors.allowed_origins);
    if !any_origin && origins.is_empty() {
        tracing::warn!("CORS 已启用但 allowed_origins 为空，已跳过启用");
        return None;
    }

    let (any_methods, methods) = parse_allowed_methods(&cors.allowed_methods);
    let (any_headers, headers) = parse_allowed_headers(&cors.allowed_headers);

    let mut layer = CorsLayer::new();

    if any_origin {
        layer = layer.allow_origin(Any);
    } else {
        layer = layer.allow_origin(origins);
    }

    if any_methods {
        layer = layer.allow_methods(Any);
    } else if !methods.is_empty() {
        layer = layer.allow_methods(methods);
    }

    if any_headers {
        layer = layer.allow_headers(Any);
    } else if !headers.is_empty() {
        layer = layer.allow_headers(headers);
    }

    Some(layer)
}

fn parse_allowed_origins(values: &[String]) -> (bool, Vec<HeaderValue>) {
    let mut any = false;
    let mut origins = Vec::new();
    for raw in values {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        if value == "*" {
            any = true;
            continue;
        }
        match HeaderValue::from_str(value) {
            Ok(v) => origins.push(v),
            Err(_) => tracing::warn!("CORS origin 非法，已忽略: {value}"),
        }
    }
    (any, origins)
}

fn parse_allowed_methods(values: &[String]) -> (bool, Vec<Method>) {
    let mut any = false;
    let mut methods = Vec::new();
    for raw in values {
        let value = raw.trim();
        if value == "*" {
            any = true;
            continue;
        }
        match value.parse::<Method>() {
            Ok(m) => methods.push(m),
            Err(_) => tracing::warn!("CORS method 非法，已忽略: {value}"),
        }
    }
    (any, methods)
}

fn parse_allowed_headers(values: &[String]) -> (bool, Vec<HeaderName>) {
    let mut any = false;
    let mut headers = Vec::new();
    for raw in values {
        let value = raw.trim();
        if value == "*" {
            any = true;
            continue;
        }
        match value.parse::<HeaderName>() {
            Ok(h) => headers.push(h),
            Err(_) => tracing::warn!("CORS header 非法，已忽略: {value}"),
        }
    }
    (any, headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_yields_no_layer() {
        let cfg = CorsConfig::default();
        assert!(build_cors_layer(&cfg).is_none());
    }

    #[test]
    fn enabled_without_origins_is_skipped() {
        let cfg = CorsConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(build_cors_layer(&cfg).is_none());
    }

    #[test]
    fn wildcard_origin_builds_a_layer() {
        let cfg = CorsConfig {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string()],
            allowed_headers: vec!["content-type".to_string()],
        };
        assert!(build_cors_layer(&cfg).is_some());
    }
}
