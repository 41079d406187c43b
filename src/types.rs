use serde::{Deserialize, Deserializer, Serialize};
use tabled::Tabled;

// ---------------------------------------------------------------------------
// Raw disclosure files (one per report year, snake_case on disk)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RawDisclosureFile {
    #[serde(default)]
    pub source_file: Option<String>,
    pub publication_date: String,
    #[serde(default)]
    pub extraction_date: Option<String>,
    pub total_groups: u32,
    pub total_benefits_value: f64,
    pub appg_groups: Vec<RawGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGroup {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub benefits_in_kind: Vec<f64>,
    #[serde(default)]
    pub total_benefits: f64,
    /// `null` entries occur in the published data and are kept so the
    /// benefit count matches the source.
    #[serde(default)]
    pub benefits_details: Vec<Option<RawBenefitDetail>>,
    #[serde(default)]
    pub categorization: Option<Categorization>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBenefitDetail {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub value_range: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub calculated_value: Option<f64>,
}

/// Accept any JSON value and keep it only if it is a usable number.
/// Strings, nulls and objects become `None` instead of failing the file.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()).filter(|n| n.is_finite()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Categorization {
    pub categories: Vec<CategoryAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    pub category: String,
    pub subcategories: Vec<String>,
}

/// Controlled vocabulary used by the categorization step.
#[derive(Debug, Clone, Deserialize)]
pub struct Themes {
    pub categories: Vec<ThemeCategory>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThemeCategory {
    pub name: String,
    pub subcategories: Vec<String>,
}

// ---------------------------------------------------------------------------
// Aggregate artifact (camelCase, consumed by the dashboard)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub name: String,
    pub title: String,
    pub total: f64,
    pub benefit_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupContribution {
    pub name: String,
    pub title: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunderSummary {
    pub name: String,
    pub total_amount: f64,
    pub appg_count: usize,
    pub appgs: Vec<GroupContribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubcategorySummary {
    pub name: String,
    pub category: String,
    pub total_amount: f64,
    pub appg_count: usize,
    pub appgs: Vec<GroupContribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub name: String,
    pub total_amount: f64,
    pub appg_count: usize,
    pub subcategory_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSummary {
    pub year: i32,
    pub total_groups: u32,
    pub total_value: f64,
    pub groups_with_benefits: usize,
    pub average_benefit: f64,
    pub skipped_benefits: usize,
    pub all_groups: Vec<GroupSummary>,
    pub all_funders: Vec<FunderSummary>,
    pub all_subcategories: Vec<SubcategorySummary>,
    pub all_categories: Vec<CategorySummary>,
}

impl YearSummary {
    pub fn top_groups(&self, n: usize) -> &[GroupSummary] {
        &self.all_groups[..n.min(self.all_groups.len())]
    }

    pub fn top_funders(&self, n: usize) -> &[FunderSummary] {
        &self.all_funders[..n.min(self.all_funders.len())]
    }

    pub fn top_subcategories(&self, n: usize) -> &[SubcategorySummary] {
        &self.all_subcategories[..n.min(self.all_subcategories.len())]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyEntry {
    pub year: i32,
    pub total: f64,
    pub benefit_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupComparison {
    pub name: String,
    pub title: String,
    pub yearly_data: Vec<YearlyEntry>,
    pub total_across_years: f64,
    pub average_per_year: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MostFundedGroup {
    pub name: String,
    pub title: String,
    pub year: i32,
    pub total: f64,
    pub benefit_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_years: usize,
    pub total_value: f64,
    pub total_groups: usize,
    pub most_funded_group: Option<MostFundedGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedData {
    pub year_summaries: Vec<YearSummary>,
    pub group_comparisons: Vec<GroupComparison>,
    pub overall_stats: OverallStats,
}

impl AggregatedData {
    /// Look up a single year; absence is not an error.
    pub fn year(&self, year: i32) -> Option<&YearSummary> {
        self.year_summaries.iter().find(|y| y.year == year)
    }
}

// ---------------------------------------------------------------------------
// Console / CSV rows
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct YearOverviewRow {
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: i32,
    #[serde(rename = "TotalGroups")]
    #[tabled(rename = "TotalGroups")]
    pub total_groups: u32,
    #[serde(rename = "GroupsWithBenefits")]
    #[tabled(rename = "GroupsWithBenefits")]
    pub groups_with_benefits: usize,
    #[serde(rename = "TotalValue")]
    #[tabled(rename = "TotalValue")]
    pub total_value: String,
    #[serde(rename = "AverageBenefit")]
    #[tabled(rename = "AverageBenefit")]
    pub average_benefit: String,
    #[serde(rename = "Funders")]
    #[tabled(rename = "Funders")]
    pub funders: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct GroupRankingRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub name: String,
    #[serde(rename = "Title")]
    #[tabled(rename = "Title")]
    pub title: String,
    #[serde(rename = "Total")]
    #[tabled(rename = "Total")]
    pub total: String,
    #[serde(rename = "Benefits")]
    #[tabled(rename = "Benefits")]
    pub benefit_count: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct FunderRankingRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Funder")]
    #[tabled(rename = "Funder")]
    pub name: String,
    #[serde(rename = "TotalAmount")]
    #[tabled(rename = "TotalAmount")]
    pub total_amount: String,
    #[serde(rename = "Groups")]
    #[tabled(rename = "Groups")]
    pub appg_count: usize,
    #[serde(rename = "TopGroup")]
    #[tabled(rename = "TopGroup")]
    pub top_group: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ComparisonRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub name: String,
    #[serde(rename = "Years")]
    #[tabled(rename = "Years")]
    pub years: String,
    #[serde(rename = "TotalAcrossYears")]
    #[tabled(rename = "TotalAcrossYears")]
    pub total_across_years: String,
    #[serde(rename = "AveragePerYear")]
    #[tabled(rename = "AveragePerYear")]
    pub average_per_year: String,
}
