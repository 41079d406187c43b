use crate::config::AggregateConfig;
use crate::error::Result;
use crate::loader::{self, YearFile};
use crate::types::{
    AggregatedData, CategorySummary, ComparisonRow, FunderRankingRow, FunderSummary,
    GroupComparison, GroupContribution, GroupRankingRow, GroupSummary, MostFundedGroup,
    OverallStats, RawDisclosureFile, RawGroup, SubcategorySummary, YearOverviewRow, YearSummary,
    YearlyEntry,
};
use crate::util::{extract_funder_name, format_currency, ratio_or_zero, round_to_bucket};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Stable descending sort on a float key; ties keep their input order.
fn sort_desc_by<T>(items: &mut [T], key: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal));
}

/// Bucket every monetary field of a raw file before anything is summed.
pub fn normalize_file(mut raw: RawDisclosureFile, width: f64) -> RawDisclosureFile {
    raw.total_benefits_value = round_to_bucket(raw.total_benefits_value, width);
    for group in &mut raw.appg_groups {
        group.total_benefits = round_to_bucket(group.total_benefits, width);
        for v in &mut group.benefits_in_kind {
            *v = round_to_bucket(*v, width);
        }
        for detail in group.benefits_details.iter_mut().flatten() {
            detail.calculated_value = detail.calculated_value.map(|v| round_to_bucket(v, width));
        }
    }
    raw
}

/// Fold one (already normalized) year into its summary.
pub fn generate_year_summary(year: i32, raw: &RawDisclosureFile) -> YearSummary {
    let mut all_groups: Vec<GroupSummary> = raw
        .appg_groups
        .iter()
        .map(|g| GroupSummary {
            name: g.name.clone(),
            title: g.title.clone(),
            total: g.total_benefits,
            benefit_count: g.benefits_details.len(),
        })
        .collect();
    sort_desc_by(&mut all_groups, |g| g.total);

    let (all_funders, skipped_benefits) = generate_funder_rankings(year, &raw.appg_groups);
    let (all_subcategories, all_categories) = generate_category_rankings(&raw.appg_groups);

    let groups_with_benefits = raw
        .appg_groups
        .iter()
        .filter(|g| g.total_benefits > 0.0)
        .count();
    let average_benefit = ratio_or_zero(raw.total_benefits_value, groups_with_benefits);

    let group_sum: f64 = all_groups.iter().map(|g| g.total).sum();
    if group_sum != raw.total_benefits_value {
        warn!(
            year,
            reported = raw.total_benefits_value,
            summed = group_sum,
            "year total does not match the sum of group totals"
        );
    }

    YearSummary {
        year,
        total_groups: raw.total_groups,
        total_value: raw.total_benefits_value,
        groups_with_benefits,
        average_benefit,
        skipped_benefits,
        all_groups,
        all_funders,
        all_subcategories,
        all_categories,
    }
}

/// Rank funders for one year. Returns the ranking and the number of benefit
/// lines that could not be attributed (no funder text or no usable value).
pub fn generate_funder_rankings(year: i32, groups: &[RawGroup]) -> (Vec<FunderSummary>, usize) {
    #[derive(Default)]
    struct Acc {
        total: f64,
        appgs: IndexMap<String, GroupContribution>,
    }

    let mut map: IndexMap<String, Acc> = IndexMap::new();
    let mut skipped = 0usize;

    for group in groups {
        let mut attributed = 0.0;
        for detail in &group.benefits_details {
            let usable = detail.as_ref().and_then(|d| {
                let source = d.source.as_deref().filter(|s| !s.is_empty())?;
                Some((source, d.calculated_value?))
            });
            let Some((source, value)) = usable else {
                skipped += 1;
                debug!(
                    year,
                    group = %group.name,
                    range = detail.as_ref().and_then(|d| d.value_range.as_deref()).unwrap_or("-"),
                    "skipping unusable benefit line"
                );
                continue;
            };
            attributed += value;

            let e = map.entry(extract_funder_name(Some(source))).or_default();
            e.total += value;
            e.appgs
                .entry(group.name.clone())
                .and_modify(|c| c.amount += value)
                .or_insert_with(|| GroupContribution {
                    name: group.name.clone(),
                    title: group.title.clone(),
                    amount: value,
                });
        }
        if attributed != group.total_benefits {
            warn!(
                year,
                group = %group.name,
                reported = group.total_benefits,
                attributed,
                "group total does not match its benefit lines"
            );
        }
    }

    let mut funders: Vec<FunderSummary> = map
        .into_iter()
        .map(|(name, acc)| {
            let mut appgs: Vec<GroupContribution> = acc.appgs.into_values().collect();
            sort_desc_by(&mut appgs, |c| c.amount);
            FunderSummary {
                name,
                total_amount: acc.total,
                appg_count: appgs.len(),
                appgs,
            }
        })
        .collect();
    sort_desc_by(&mut funders, |f| f.total_amount);
    (funders, skipped)
}

/// Credit each funded, categorized group's total to every distinct
/// (category, subcategory) it carries, and to each distinct category once.
pub fn generate_category_rankings(
    groups: &[RawGroup],
) -> (Vec<SubcategorySummary>, Vec<CategorySummary>) {
    struct SubAcc {
        total: f64,
        appgs: IndexMap<String, GroupContribution>,
    }
    #[derive(Default)]
    struct CatAcc {
        total: f64,
        groups: HashSet<String>,
        subcategories: HashSet<String>,
    }

    let mut subs: IndexMap<(String, String), SubAcc> = IndexMap::new();
    let mut cats: IndexMap<String, CatAcc> = IndexMap::new();

    for group in groups.iter().filter(|g| g.total_benefits > 0.0) {
        let Some(categorization) = &group.categorization else {
            continue;
        };
        for assignment in &categorization.categories {
            // A group tagged with several subcategories of one category is
            // still a single group there; summing subcategory totals would
            // count it once per subcategory.
            let cat = cats.entry(assignment.category.clone()).or_default();
            if cat.groups.insert(group.name.clone()) {
                cat.total += group.total_benefits;
            }
            for sub in &assignment.subcategories {
                cat.subcategories.insert(sub.clone());
                let e = subs
                    .entry((assignment.category.clone(), sub.clone()))
                    .or_insert_with(|| SubAcc {
                        total: 0.0,
                        appgs: IndexMap::new(),
                    });
                if !e.appgs.contains_key(&group.name) {
                    e.total += group.total_benefits;
                    e.appgs.insert(
                        group.name.clone(),
                        GroupContribution {
                            name: group.name.clone(),
                            title: group.title.clone(),
                            amount: group.total_benefits,
                        },
                    );
                }
            }
        }
    }

    let mut subcategories: Vec<SubcategorySummary> = subs
        .into_iter()
        .map(|((category, name), acc)| {
            let mut appgs: Vec<GroupContribution> = acc.appgs.into_values().collect();
            sort_desc_by(&mut appgs, |c| c.amount);
            SubcategorySummary {
                name,
                category,
                total_amount: acc.total,
                appg_count: appgs.len(),
                appgs,
            }
        })
        .collect();
    sort_desc_by(&mut subcategories, |s| s.total_amount);

    let mut categories: Vec<CategorySummary> = cats
        .into_iter()
        .map(|(name, acc)| CategorySummary {
            name,
            total_amount: acc.total,
            appg_count: acc.groups.len(),
            subcategory_count: acc.subcategories.len(),
        })
        .collect();
    sort_desc_by(&mut categories, |c| c.total_amount);

    (subcategories, categories)
}

/// Fold every year's groups into one record per group name. Years a group
/// is missing from simply have no entry.
pub fn generate_group_comparisons(years: &[YearFile]) -> Vec<GroupComparison> {
    let mut map: IndexMap<String, GroupComparison> = IndexMap::new();
    for file in years {
        for group in &file.raw.appg_groups {
            let e = map
                .entry(group.name.clone())
                .or_insert_with(|| GroupComparison {
                    name: group.name.clone(),
                    title: group.title.clone(),
                    yearly_data: Vec::new(),
                    total_across_years: 0.0,
                    average_per_year: 0.0,
                });
            e.yearly_data.push(YearlyEntry {
                year: file.year,
                total: group.total_benefits,
                benefit_count: group.benefits_details.len(),
            });
            e.total_across_years += group.total_benefits;
        }
    }

    let mut comparisons: Vec<GroupComparison> = map
        .into_values()
        .map(|mut c| {
            c.average_per_year = ratio_or_zero(c.total_across_years, c.yearly_data.len());
            c
        })
        .collect();
    sort_desc_by(&mut comparisons, |c| c.total_across_years);
    comparisons
}

pub fn generate_overall_stats(
    year_summaries: &[YearSummary],
    comparisons: &[GroupComparison],
) -> OverallStats {
    let mut most_funded: Option<MostFundedGroup> = None;
    for group in comparisons {
        for entry in &group.yearly_data {
            if most_funded.as_ref().map_or(true, |m| entry.total > m.total) {
                most_funded = Some(MostFundedGroup {
                    name: group.name.clone(),
                    title: group.title.clone(),
                    year: entry.year,
                    total: entry.total,
                    benefit_count: entry.benefit_count,
                });
            }
        }
    }

    OverallStats {
        total_years: year_summaries.len(),
        total_value: year_summaries.iter().map(|y| y.total_value).sum(),
        total_groups: comparisons.len(),
        most_funded_group: most_funded,
    }
}

/// Aggregate already-loaded year files (ascending year order expected).
pub fn build_aggregates(files: Vec<YearFile>, bucket_width: f64) -> AggregatedData {
    let files: Vec<YearFile> = files
        .into_iter()
        .map(|f| YearFile {
            raw: normalize_file(f.raw, bucket_width),
            ..f
        })
        .collect();

    let mut year_summaries: Vec<YearSummary> = files
        .iter()
        .map(|f| generate_year_summary(f.year, &f.raw))
        .collect();
    year_summaries.sort_by_key(|y| y.year);

    let group_comparisons = generate_group_comparisons(&files);
    let overall_stats = generate_overall_stats(&year_summaries, &group_comparisons);

    let skipped: usize = year_summaries.iter().map(|y| y.skipped_benefits).sum();
    info!(
        years = year_summaries.len(),
        groups = group_comparisons.len(),
        skipped_benefits = skipped,
        "aggregates built"
    );

    AggregatedData {
        year_summaries,
        group_comparisons,
        overall_stats,
    }
}

/// Load every raw file under the configured directory and aggregate it.
pub fn build_from_sources(config: &AggregateConfig) -> Result<AggregatedData> {
    let (files, _report) = loader::load_all(&config.paths)?;
    Ok(build_aggregates(files, config.bucket_width))
}

// ---------------------------------------------------------------------------
// Table rows for console previews and CSV exports
// ---------------------------------------------------------------------------

pub fn year_overview_rows(data: &AggregatedData) -> Vec<YearOverviewRow> {
    data.year_summaries
        .iter()
        .map(|y| YearOverviewRow {
            year: y.year,
            total_groups: y.total_groups,
            groups_with_benefits: y.groups_with_benefits,
            total_value: format_currency(y.total_value),
            average_benefit: format_currency(y.average_benefit),
            funders: y.all_funders.len(),
        })
        .collect()
}

pub fn group_ranking_rows(groups: &[GroupSummary]) -> Vec<GroupRankingRow> {
    groups
        .iter()
        .enumerate()
        .map(|(idx, g)| GroupRankingRow {
            rank: idx + 1,
            name: g.name.clone(),
            title: g.title.clone(),
            total: format_currency(g.total),
            benefit_count: g.benefit_count,
        })
        .collect()
}

pub fn funder_ranking_rows(funders: &[FunderSummary]) -> Vec<FunderRankingRow> {
    funders
        .iter()
        .enumerate()
        .map(|(idx, f)| FunderRankingRow {
            rank: idx + 1,
            name: f.name.clone(),
            total_amount: format_currency(f.total_amount),
            appg_count: f.appg_count,
            top_group: f.appgs.first().map(|c| c.name.clone()).unwrap_or_default(),
        })
        .collect()
}

pub fn comparison_rows(comparisons: &[GroupComparison]) -> Vec<ComparisonRow> {
    comparisons
        .iter()
        .enumerate()
        .map(|(idx, c)| ComparisonRow {
            rank: idx + 1,
            name: c.name.clone(),
            years: c
                .yearly_data
                .iter()
                .map(|y| y.year.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            total_across_years: format_currency(c.total_across_years),
            average_per_year: format_currency(c.average_per_year),
        })
        .collect()
}
