// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::utils::text_processing::normalize_text;

static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("valid title selector"));
static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("valid body selector"));
static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

/// 不参与正文的元素
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// 选择器解析错误
#[derive(Debug, thiserror::Error)]
#[error("Invalid selector '{selector}': {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub reason: String,
}

/// 提取结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub text: String,
    pub html: String,
    pub links: Vec<String>,
}

/// 页面内容提取器
///
/// 未配置选择器时提取整个 body；配置后只保留匹配元素的文本与HTML。
/// 链接始终从整页收集。
#[derive(Debug, Clone, Default)]
pub struct PageExtractor {
    include: Vec<Selector>,
}

impl PageExtractor {
    pub fn new(include_selectors: &[String]) -> Result<Self, SelectorError> {
        let include = include_selectors
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                Selector::parse(s).map_err(|e| SelectorError {
                    selector: s.to_string(),
                    reason: format!("{:?}", e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { include })
    }

    pub fn is_selective(&self) -> bool {
        !self.include.is_empty()
    }

    pub fn extract(&self, html: &str) -> ExtractedContent {
        let document = Html::parse_document(html);

        let title = document
            .select(&TITLE_SELECTOR)
            .next()
            .map(|t| normalize_text(&t.text().collect::<String>()))
            .filter(|t| !t.is_empty());

        let links = document
            .select(&ANCHOR_SELECTOR)
            .filter_map(|a| a.value().attr("href"))
            .map(str::to_string)
            .collect();

        let (text, html) = if self.is_selective() {
            let mut parts = Vec::new();
            let mut fragments = Vec::new();
            for selector in &self.include {
                for element in document.select(selector) {
                    parts.push(visible_text(element));
                    fragments.push(element.html());
                }
            }
            (normalize_text(&parts.join(" ")), fragments.join("\n"))
        } else {
            let text = document
                .select(&BODY_SELECTOR)
                .next()
                .map(visible_text)
                .unwrap_or_default();
            (normalize_text(&text), html.to_string())
        };

        ExtractedContent {
            title,
            text,
            html,
            links,
        }
    }
}

/// 元素内可见文本，跳过脚本和样式
fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .is_some_and(|name| SKIPPED_ELEMENTS.contains(&name));
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    out
}
