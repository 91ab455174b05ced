// src/i18n.rs
// Locale negotiation and the small catalogue of user-facing messages

use actix_web::HttpMessage;
use actix_web::HttpRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    ZhHans,
}

impl Locale {
    pub fn tag(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::ZhHans => "zh-Hans",
        }
    }

    /// Map a BCP 47 tag onto a supported locale.
    pub fn from_tag(tag: &str) -> Option<Locale> {
        let tag = tag.trim().to_ascii_lowercase();
        if tag.is_empty() {
            return None;
        }
        let primary = tag.split(['-', '_']).next().unwrap_or("");
        match primary {
            "en" => Some(Locale::En),
            "zh" => {
                // Traditional script and regions are not translated
                let traditional = tag.contains("hant")
                    || tag.ends_with("-tw")
                    || tag.ends_with("-hk")
                    || tag.ends_with("-mo");
                if traditional {
                    None
                } else {
                    Some(Locale::ZhHans)
                }
            }
            _ => None,
        }
    }

    /// Best supported locale for an `Accept-Language` value.
    pub fn from_accept_language(header: &str) -> Option<Locale> {
        let mut candidates: Vec<(f32, &str)> = header
            .split(',')
            .filter_map(|part| {
                let mut pieces = part.split(';');
                let tag = pieces.next()?.trim();
                let quality = pieces
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .unwrap_or(1.0);
                (quality > 0.0 && !tag.is_empty()).then_some((quality, tag))
            })
            .collect();

        // Stable sort keeps header order among equal weights
        candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        candidates.into_iter().find_map(|(_, tag)| Locale::from_tag(tag))
    }

    /// `?lang=` first, then the `lang` cookie, then `Accept-Language`.
    pub fn negotiate(
        query_lang: Option<&str>,
        cookie_lang: Option<&str>,
        accept_language: Option<&str>,
    ) -> Locale {
        if let Some(lang) = query_lang.filter(|l| !l.is_empty()) {
            return Locale::from_accept_language(lang).unwrap_or_default();
        }
        if let Some(lang) = cookie_lang.filter(|l| !l.is_empty()) {
            return Locale::from_accept_language(lang).unwrap_or_default();
        }
        accept_language
            .and_then(Locale::from_accept_language)
            .unwrap_or_default()
    }

    /// The locale attached by the negotiation middleware, or the default.
    pub fn of(req: &HttpRequest) -> Locale {
        req.extensions().get::<Locale>().copied().unwrap_or_default()
    }
}

/// Localized text for a message key. Keys are the English messages.
pub fn translate(locale: Locale, key: &str) -> &str {
    match locale {
        Locale::En => key,
        Locale::ZhHans => match key {
            "404 page not found" => "404 页面未找到",
            "403 Forbidden" => "403 禁止访问",
            "400 Bad Request" => "400 请求无效",
            "500 Internal Server Error" => "500 服务器内部错误",
            "read-only" => "只读",
            "Too many requests, Please try again later." => "请求过多，请稍后再试。",
            other => other,
        },
    }
}
