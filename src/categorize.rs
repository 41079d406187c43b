// Offline enrichment: tag each raw group with one or more theme
// (category, subcategories) pairs using a text-completion service.
// Runs against the raw files in place and is safe to re-run; groups that
// already carry a categorization are left alone.
use crate::config::DataPaths;
use crate::error::{ReportError, Result};
use crate::output::write_json;
use crate::types::{CategoryAssignment, Categorization, Themes};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

pub const DEFAULT_MODEL: &str = "o3";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DATA_FILE_SUFFIX: &str = "_appg_data.json";
const SYSTEM_PROMPT: &str =
    "You are a precise categorization assistant. Return only valid JSON responses.";

/// Anything that can turn a prompt into a completion.
pub trait CompletionClient {
    fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: String, model: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    /// Build a client from `OPENAI_API_KEY`.
    pub fn from_env(base_url: &str, model: &str) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ReportError::MissingApiKey)?;
        Self::new(base_url, api_key, model)
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };
        let response: ChatResponse = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| ReportError::Categorization("empty completion".into()))
    }
}

#[derive(Debug, Clone)]
pub struct CategorizeOptions {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Pause between groups.
    pub rate_limit_delay: Duration,
}

impl Default for CategorizeOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            rate_limit_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategorizeOutcome {
    pub processed: usize,
    pub skipped: usize,
}

/// Who a group is, as far as the prompt cares.
#[derive(Debug, Clone)]
pub struct GroupProfile {
    pub name: String,
    pub title: String,
    pub purpose: String,
}

pub fn default_categorization() -> Categorization {
    Categorization {
        categories: vec![CategoryAssignment {
            category: "Parliament and elections".into(),
            subcategories: vec!["Parliament".into()],
        }],
    }
}

pub fn load_themes(path: &Path) -> Result<Themes> {
    let content = fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
    let themes: Themes = serde_json::from_str(&content).map_err(|e| ReportError::json(path, e))?;
    if themes.categories.is_empty() {
        return Err(ReportError::Themes(format!(
            "{} defines no categories",
            path.display()
        )));
    }
    Ok(themes)
}

pub fn build_prompt(group: &GroupProfile, themes: &Themes) -> String {
    let vocabulary = serde_json::to_string_pretty(&themes.categories).unwrap_or_default();
    format!(
        r#"You are an expert in UK parliamentary affairs and policy categorization.

Given this All-Party Parliamentary Group (APPG):

Name: {name}
Title: {title}
Purpose: {purpose}

Categorize it into one or more of these predefined themes. Each APPG must have at least one subcategory, but can have multiple if relevant:

{vocabulary}

Rules:
1. Every APPG must be assigned to at least one subcategory
2. Multiple categories are allowed and encouraged if the APPG spans multiple areas
3. Be specific - choose the most relevant subcategories
4. Consider the APPG's stated purpose carefully
5. For country/region-specific APPGs, always include the relevant World Affairs subcategory

Return ONLY a valid JSON object with this exact structure:
{{
  "categories": [
    {{
      "category": "Category Name",
      "subcategories": ["Subcategory1", "Subcategory2"]
    }}
  ]
}}

Do not include any explanation or additional text."#,
        name = group.name,
        title = group.title,
        purpose = group.purpose,
    )
}

/// Parse a completion and check every pair against the vocabulary.
pub fn parse_categorization(content: &str, themes: &Themes) -> Result<Categorization> {
    let parsed: Categorization = serde_json::from_str(content.trim())
        .map_err(|e| ReportError::Categorization(format!("invalid JSON response: {e}")))?;
    if parsed.categories.is_empty() {
        return Err(ReportError::Categorization("no categories returned".into()));
    }
    for assignment in &parsed.categories {
        let theme = themes
            .categories
            .iter()
            .find(|t| t.name == assignment.category)
            .ok_or_else(|| {
                ReportError::Categorization(format!("unknown category: {}", assignment.category))
            })?;
        if assignment.subcategories.is_empty() {
            return Err(ReportError::Categorization(format!(
                "no subcategories for category: {}",
                assignment.category
            )));
        }
        if let Some(sub) = assignment
            .subcategories
            .iter()
            .find(|s| !theme.subcategories.contains(s))
        {
            return Err(ReportError::Categorization(format!(
                "unknown subcategory: {sub} in category: {}",
                assignment.category
            )));
        }
    }
    Ok(parsed)
}

/// Categorize one group, retrying failures; falls back to the default
/// assignment once retries are exhausted.
pub fn categorize_group<C: CompletionClient>(
    client: &C,
    group: &GroupProfile,
    themes: &Themes,
    opts: &CategorizeOptions,
) -> Categorization {
    let prompt = build_prompt(group, themes);
    let mut attempt = 0;
    loop {
        let result = client
            .complete(SYSTEM_PROMPT, &prompt)
            .and_then(|content| parse_categorization(&content, themes));
        match result {
            Ok(categorization) => return categorization,
            Err(e) if attempt < opts.max_retries => {
                attempt += 1;
                warn!(group = %group.name, attempt, error = %e, "categorization failed, retrying");
                thread::sleep(opts.retry_delay);
            }
            Err(e) => {
                error!(group = %group.name, error = %e, "categorization failed, using default");
                return default_categorization();
            }
        }
    }
}

fn profile_of(group: &Value) -> GroupProfile {
    let text = |key: &str| {
        group
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    GroupProfile {
        name: text("name"),
        title: text("title"),
        purpose: text("purpose"),
    }
}

/// Annotate every uncategorized group in one raw file and rewrite it.
/// Unknown fields are preserved untouched.
pub fn categorize_file<C: CompletionClient>(
    client: &C,
    path: &Path,
    themes: &Themes,
    opts: &CategorizeOptions,
) -> Result<CategorizeOutcome> {
    let content = fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
    let mut data: Value = serde_json::from_str(&content).map_err(|e| ReportError::json(path, e))?;
    let groups = data
        .get_mut("appg_groups")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| {
            ReportError::Categorization(format!("{} has no appg_groups array", path.display()))
        })?;

    let mut outcome = CategorizeOutcome::default();
    let total = groups.len();
    for (idx, group) in groups.iter_mut().enumerate() {
        if group.get("categorization").is_some_and(|c| !c.is_null()) {
            outcome.skipped += 1;
            continue;
        }
        let profile = profile_of(group);
        let Some(obj) = group.as_object_mut() else {
            continue;
        };
        info!(file = %path.display(), "categorizing {}/{}: {}", idx + 1, total, profile.name);

        let categorization = categorize_group(client, &profile, themes, opts);
        let summary = categorization
            .categories
            .iter()
            .map(|c| format!("{} > {}", c.category, c.subcategories.join(", ")))
            .collect::<Vec<_>>()
            .join(" | ");
        info!(group = %profile.name, "{summary}");

        let value = serde_json::to_value(&categorization).map_err(|e| ReportError::json(path, e))?;
        obj.insert("categorization".into(), value);
        outcome.processed += 1;
        thread::sleep(opts.rate_limit_delay);
    }

    write_json(path, &data)?;
    info!(
        file = %path.display(),
        processed = outcome.processed,
        skipped = outcome.skipped,
        "file categorized"
    );
    Ok(outcome)
}

fn data_files(raw_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(raw_dir)
        .map_err(|e| ReportError::io(raw_dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(DATA_FILE_SUFFIX))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Categorize every `*_appg_data.json` file. A file that fails is logged
/// and counted as nothing done; the batch carries on.
pub fn categorize_all<C: CompletionClient>(
    client: &C,
    paths: &DataPaths,
    opts: &CategorizeOptions,
) -> Result<CategorizeOutcome> {
    let themes = load_themes(&paths.themes())?;
    info!(categories = themes.categories.len(), "loaded theme vocabulary");

    let files = data_files(&paths.raw_dir)?;
    info!(files = files.len(), "found raw data files");

    let mut total = CategorizeOutcome::default();
    for file in &files {
        match categorize_file(client, file, &themes, opts) {
            Ok(outcome) => {
                total.processed += outcome.processed;
                total.skipped += outcome.skipped;
            }
            Err(e) => error!(file = %file.display(), error = %e, "failed to categorize file"),
        }
    }
    Ok(total)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorizationStats {
    pub total_groups: usize,
    pub categorized: usize,
    /// `"Category > Subcategory"` with group counts, most common first.
    pub distribution: Vec<(String, usize)>,
}

impl CategorizationStats {
    pub fn coverage_pct(&self) -> f64 {
        crate::util::ratio_or_zero(self.categorized as f64 * 100.0, self.total_groups)
    }
}

pub fn categorization_stats(paths: &DataPaths) -> Result<CategorizationStats> {
    let mut stats = CategorizationStats::default();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for path in data_files(&paths.raw_dir)? {
        let content = fs::read_to_string(&path).map_err(|e| ReportError::io(&path, e))?;
        let data: Value = serde_json::from_str(&content).map_err(|e| ReportError::json(&path, e))?;
        let groups = data
            .get("appg_groups")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for group in groups {
            stats.total_groups += 1;
            let Some(raw) = group.get("categorization").filter(|c| !c.is_null()) else {
                continue;
            };
            stats.categorized += 1;
            let Ok(categorization) = serde_json::from_value::<Categorization>(raw.clone()) else {
                warn!(file = %path.display(), "malformed categorization ignored");
                continue;
            };
            for c in &categorization.categories {
                for sub in &c.subcategories {
                    *counts.entry(format!("{} > {}", c.category, sub)).or_default() += 1;
                }
            }
        }
    }

    let mut distribution: Vec<(String, usize)> = counts.into_iter().collect();
    distribution.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    stats.distribution = distribution;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    struct ScriptedClient {
        replies: RefCell<VecDeque<Result<String>>>,
        calls: Cell<usize>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                calls: Cell::new(0),
            }
        }
    }

    impl CompletionClient for ScriptedClient {
        fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(ReportError::Categorization("script exhausted".into())))
        }
    }

    fn themes() -> Themes {
        serde_json::from_value(json!({
            "categories": [
                {"name": "Health", "subcategories": ["NHS", "Mental health"]},
                {"name": "Parliament and elections", "subcategories": ["Parliament"]}
            ]
        }))
        .unwrap()
    }

    fn no_wait() -> CategorizeOptions {
        CategorizeOptions {
            max_retries: 3,
            retry_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
        }
    }

    fn profile() -> GroupProfile {
        GroupProfile {
            name: "health".into(),
            title: "Health APPG".into(),
            purpose: "To discuss health".into(),
        }
    }

    const NHS: &str = r#"{"categories": [{"category": "Health", "subcategories": ["NHS"]}]}"#;

    #[test]
    fn accepts_vocabulary_terms() {
        let parsed = parse_categorization(NHS, &themes()).unwrap();
        assert_eq!(parsed.categories[0].subcategories, vec!["NHS"]);
    }

    #[test]
    fn rejects_unknown_terms() {
        let bad_category = r#"{"categories": [{"category": "Sport", "subcategories": ["Golf"]}]}"#;
        let bad_sub = r#"{"categories": [{"category": "Health", "subcategories": ["Golf"]}]}"#;
        for content in [bad_category, bad_sub, "not json", r#"{"categories": []}"#] {
            assert!(parse_categorization(content, &themes()).is_err(), "{content}");
        }
    }

    #[test]
    fn retries_then_succeeds() {
        let client = ScriptedClient::new(vec![
            Err(ReportError::Categorization("timeout".into())),
            Ok("garbage".into()),
            Ok(NHS.into()),
        ]);
        let result = categorize_group(&client, &profile(), &themes(), &no_wait());
        assert_eq!(client.calls.get(), 3);
        assert_eq!(result.categories[0].category, "Health");
    }

    #[test]
    fn falls_back_after_bounded_retries() {
        let client = ScriptedClient::new(vec![]);
        let result = categorize_group(&client, &profile(), &themes(), &no_wait());
        assert_eq!(client.calls.get(), 4);
        assert_eq!(result, default_categorization());
    }

    #[test]
    fn prompt_mentions_group_and_vocabulary() {
        let prompt = build_prompt(&profile(), &themes());
        assert!(prompt.contains("Name: health"));
        assert!(prompt.contains("Mental health"));
    }

    #[test]
    fn file_pass_is_idempotent_and_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        fs::create_dir_all(&raw).unwrap();
        fs::write(
            raw.join("themes.json"),
            serde_json::to_string(&json!({
                "categories": [
                    {"name": "Health", "subcategories": ["NHS", "Mental health"]},
                    {"name": "Parliament and elections", "subcategories": ["Parliament"]}
                ]
            }))
            .unwrap(),
        )
        .unwrap();
        let file = raw.join("2020_appg_data.json");
        fs::write(
            &file,
            serde_json::to_string(&json!({
                "publication_date": "200520",
                "extraction_date": "2024-01-01",
                "appg_groups": [
                    {"name": "health", "title": "Health", "purpose": "p"},
                    {"name": "done", "title": "Done", "purpose": "p",
                     "categorization": {"categories": [{"category": "Health", "subcategories": ["NHS"]}]}}
                ]
            }))
            .unwrap(),
        )
        .unwrap();
        let paths = DataPaths::new(&raw, dir.path().join("cache"));

        let client = ScriptedClient::new(vec![Ok(NHS.into())]);
        let outcome = categorize_all(&client, &paths, &no_wait()).unwrap();
        assert_eq!(outcome, CategorizeOutcome { processed: 1, skipped: 1 });

        let written: Value = serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(written["extraction_date"], "2024-01-01");
        assert_eq!(
            written["appg_groups"][0]["categorization"]["categories"][0]["subcategories"][0],
            "NHS"
        );

        let client = ScriptedClient::new(vec![]);
        let outcome = categorize_all(&client, &paths, &no_wait()).unwrap();
        assert_eq!(outcome, CategorizeOutcome { processed: 0, skipped: 2 });
        assert_eq!(client.calls.get(), 0);

        let stats = categorization_stats(&paths).unwrap();
        assert_eq!(stats.total_groups, 2);
        assert_eq!(stats.categorized, 2);
        assert_eq!(stats.coverage_pct(), 100.0);
        assert_eq!(stats.distribution, vec![("Health > NHS".to_string(), 2)]);
    }

    #[test]
    fn missing_themes_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path(), dir.path().join("cache"));
        let client = ScriptedClient::new(vec![]);
        assert!(matches!(
            categorize_all(&client, &paths, &no_wait()),
            Err(ReportError::Io { .. })
        ));
    }
}
