// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashSet;
use url::{ParseError, Url};

/// 规范化时丢弃的跟踪参数
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid"];

/// 将可能为相对路径的URL转换为绝对路径URL
pub fn resolve_url(base_url: &Url, path: &str) -> Result<Url, ParseError> {
    base_url.join(path)
}

fn is_tracking_param(name: &str) -> bool {
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name)
}

/// URL规范化
///
/// 去掉片段、丢弃跟踪参数并按键排序查询串。默认端口和主机名大小写
/// 由 `url` 解析器统一处理。
pub fn canonicalize_url(raw: &str) -> Result<Url, ParseError> {
    let mut url = Url::parse(raw)?;
    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    Ok(url)
}

/// 获取URL的源，非 http(s) 或无法解析时返回 None
pub fn origin_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// 从页面上的 href 列表中筛出可入队的链接
///
/// 相对链接基于 `page_url` 解析；结果已规范化、去重，并保持首次出现的顺序。
pub fn discover_links<'a, I>(page_url: &Url, hrefs: I, same_origin_only: bool) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let page_origin = page_url.origin();
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for href in hrefs {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let Ok(resolved) = resolve_url(page_url, href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        if same_origin_only && resolved.origin() != page_origin {
            continue;
        }
        let Ok(canonical) = canonicalize_url(resolved.as_str()) else {
            continue;
        };
        let canonical = canonical.to_string();
        if seen.insert(canonical.clone()) {
            links.push(canonical);
        }
    }

    links
}
