use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use serde::{Deserialize, Serialize};

use crate::analyze::{parse_analysis, DealAnalysis, DealAnalyzer, DealQuery, SearchLink};
use crate::error::ProviderError;
use crate::ingest::parse_listing_array;
use crate::ingest::types::{FilterCriteria, ListingProvider, RawListing};

const ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// Used instead of the configured model when the analysis carries an image.
const IMAGE_MODEL: &str = "gemini-3-pro-image-preview";

/// Search-grounded Gemini provider. Requires an API key (see `[provider]` config).
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .user_agent("snipe-monitor/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: ENDPOINT.to_string(),
        })
    }

    /// Point at a different host (local stub servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Prompt asking for a strict JSON array of recent listings.
pub fn build_prompt(criteria: &FilterCriteria) -> String {
    let brands = if criteria.brands.is_empty() {
        "popular brands".to_string()
    } else {
        join(&criteria.brands, " OR ")
    };
    let categories = if criteria.categories.is_empty() {
        "clothes".to_string()
    } else {
        join(&criteria.categories, " OR ")
    };
    let sizes = join(&criteria.sizes, " ");

    format!(
        "Find 4 recent Vinted listings (vinted.fr/com).\n\
         Query: \"{brands} {categories} {sizes} under {ceiling} eur\"\n\n\
         Return JSON array:\n\
         [{{\"title\": \"Item Name\", \"price\": 20, \"link\": \"https://vinted...\", \"description\": \"cond...\"}}]\n\n\
         Strict JSON. No markdown.",
        ceiling = criteria.price_ceiling,
    )
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>, sep: &str) -> String {
    items
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(sep)
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}
#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}
#[derive(Serialize)]
struct Tool {
    google_search: serde_json::Value,
}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}
#[derive(Serialize)]
struct Req<'a> {
    contents: Vec<Content<'a>>,
    tools: Vec<Tool>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    candidates: Vec<Candidate>,
}
#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(default, rename = "groundingMetadata")]
    grounding_metadata: Option<GroundingMetadata>,
}
#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}
#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}
#[derive(Deserialize)]
struct GroundingMetadata {
    #[serde(default, rename = "groundingChunks")]
    grounding_chunks: Vec<GroundingChunk>,
}
#[derive(Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}
#[derive(Deserialize)]
struct WebChunk {
    #[serde(default)]
    title: String,
    #[serde(default)]
    uri: String,
}

/// Concatenated text of the first candidate, if any.
fn response_text(resp: &Resp) -> String {
    resp.candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|c| {
            c.parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

/// Web sources the search tool grounded the first candidate on.
fn search_links(resp: &Resp) -> Vec<SearchLink> {
    resp.candidates
        .first()
        .and_then(|c| c.grounding_metadata.as_ref())
        .map(|g| {
            g.grounding_chunks
                .iter()
                .filter_map(|c| c.web.as_ref())
                .filter(|w| !w.uri.is_empty())
                .map(|w| SearchLink {
                    title: w.title.clone(),
                    url: w.uri.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Prompt asking for a resale estimate as a single JSON object.
pub fn build_analysis_prompt(query: &DealQuery) -> String {
    format!(
        "Analyze resale value for: \"{}\" at {} EUR.\n\
         Search current markets.\n\
         Return JSON: {{ \"score\": 0-100, \"estimatedValue\": number, \"reasoning\": \"string\", \"isGoodDeal\": boolean }}",
        query.description, query.price
    )
}

impl GeminiProvider {
    /// One search-grounded `generateContent` call.
    async fn generate(
        &self,
        model: &str,
        parts: Vec<Part<'_>>,
        json_mode: bool,
    ) -> Result<Resp, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey);
        }
        let req = Req {
            contents: vec![Content {
                role: "user",
                parts,
            }],
            tools: vec![Tool {
                google_search: serde_json::json!({}),
            }],
            generation_config: json_mode.then_some(GenerationConfig {
                response_mime_type: "application/json",
            }),
        };

        let url = format!("{}/{}:generateContent", self.base_url, model);
        let resp = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        resp.json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ListingProvider for GeminiProvider {
    async fn query(&self, criteria: &FilterCriteria) -> Result<Vec<RawListing>, ProviderError> {
        let t0 = Instant::now();
        let prompt = build_prompt(criteria);
        let body = self
            .generate(&self.model, vec![Part::Text { text: &prompt }], false)
            .await?;
        let out = parse_listing_array(&response_text(&body))?;

        histogram!("provider_query_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::debug!(target: "poll", provider = "gemini", items = out.len(), "query ok");
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[async_trait]
impl DealAnalyzer for GeminiProvider {
    async fn analyze(&self, query: &DealQuery) -> Result<DealAnalysis, ProviderError> {
        let t0 = Instant::now();
        let prompt = build_analysis_prompt(query);

        let mut parts = Vec::with_capacity(2);
        if let Some(img) = &query.image {
            parts.push(Part::Inline {
                inline_data: InlineData {
                    mime_type: &img.mime_type,
                    data: &img.data_base64,
                },
            });
        }
        parts.push(Part::Text { text: &prompt });
        let model = if query.image.is_some() {
            IMAGE_MODEL
        } else {
            self.model.as_str()
        };

        let body = self.generate(model, parts, true).await?;
        let out = parse_analysis(&response_text(&body), search_links(&body))?;

        histogram!("analysis_query_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_falls_back_to_generic_terms() {
        let p = build_prompt(&FilterCriteria::new(30.0));
        assert!(p.contains("popular brands clothes"));
        assert!(p.contains("under 30 eur"));
    }

    #[test]
    fn prompt_joins_selected_terms() {
        let c = FilterCriteria::new(45.0)
            .with_brands(["Nike", "Adidas"])
            .with_categories(["Hoodie"])
            .with_sizes(["L", "XL"]);
        let p = build_prompt(&c);
        assert!(p.contains("\"Adidas OR Nike Hoodie L XL under 45 eur\""));
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let resp: Resp = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"[{\"ti"},{"text":"tle\":\"x\"}]"}]}}]}"#,
        )
        .unwrap();
        let text = response_text(&resp);
        let items = parse_listing_array(&text).unwrap();
        assert_eq!(items[0].title.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn missing_key_is_reported_without_network() {
        let p = GeminiProvider::new("", "m").unwrap();
        let err = p.query(&FilterCriteria::new(10.0)).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey));
    }

    #[test]
    fn grounding_chunks_become_search_links() {
        let resp: Resp = serde_json::from_str(
            r#"{"candidates":[{
                "content":{"parts":[{"text":"{\"score\":72,\"estimatedValue\":45,\"reasoning\":\"Sells for 40-50\",\"isGoodDeal\":true}"}]},
                "groundingMetadata":{"groundingChunks":[
                    {"web":{"title":"vinted.fr","uri":"https://www.vinted.fr/items/1"}},
                    {"retrievedContext":{}},
                    {"web":{"title":"ebay","uri":"https://ebay.fr/x"}}
                ]}
            }]}"#,
        )
        .unwrap();
        let a = parse_analysis(&response_text(&resp), search_links(&resp)).unwrap();
        assert_eq!(a.score, 72);
        assert!(a.is_good_deal);
        assert_eq!(a.search_links.len(), 2);
        assert_eq!(a.search_links[0].url, "https://www.vinted.fr/items/1");
    }

    #[test]
    fn analysis_request_puts_image_before_prompt() {
        let req = Req {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type: "image/jpeg",
                            data: "AAAA",
                        },
                    },
                    Part::Text { text: "p" },
                ],
            }],
            tools: vec![],
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json",
            }),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(v["contents"][0]["parts"][1]["text"], "p");
        assert_eq!(v["generationConfig"]["responseMimeType"], "application/json");
    }

    #[tokio::test]
    async fn analysis_without_key_falls_back() {
        let p = GeminiProvider::new("", "m").unwrap();
        let q = DealQuery::text("Carhartt Double Knee W32", 35.0);
        assert!(matches!(p.analyze(&q).await, Err(ProviderError::MissingApiKey)));
        assert_eq!(
            crate::analyze::analyze_or_fallback(&p, &q).await,
            DealAnalysis::failed()
        );
    }
}
