//! Derived views over the final dataset: winners, trends and volatility.
//!
//! All the functions take the rows produced by [`crate::run_transform`] and
//! never fail: a year or a seccional without data simply yields nothing.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::*;
use crate::round2;

/// The party with the most votes in a seccional for a year.
#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub year: u32,
    pub seccional: SeccionalId,
    pub party: String,
    pub votes: u64,
    pub percentage: f64,
    /// Lead over the second party, in percentage points. Equal to the
    /// winner's percentage when it ran alone.
    pub margin: f64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct PartyTotal {
    pub party: String,
    pub votes: u64,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthRate {
    pub party: String,
    pub from_year: u32,
    pub to_year: u32,
    pub from_votes: u64,
    pub to_votes: u64,
    /// Relative change in percent. `None` when the party had no votes in the
    /// base year.
    pub growth: Option<f64>,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Competitive {
    pub year: u32,
    pub seccional: SeccionalId,
    pub first: String,
    pub second: String,
    pub margin: f64,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Swing {
    pub seccional: SeccionalId,
    pub from_winner: Option<String>,
    pub to_winner: Option<String>,
    pub flipped: bool,
}

/// The years present in the dataset, ascending.
pub fn years(results: &[ElectoralResult]) -> Vec<u32> {
    let ys: BTreeSet<u32> = results.iter().map(|r| r.year).collect();
    ys.into_iter().collect()
}

// The rows of each seccional for the year, best first. Ties go to the party
// name that sorts first.
fn ranked_by_seccional(
    results: &[ElectoralResult],
    year: u32,
) -> BTreeMap<SeccionalId, Vec<&ElectoralResult>> {
    let mut res: BTreeMap<SeccionalId, Vec<&ElectoralResult>> = BTreeMap::new();
    for r in results.iter().filter(|r| r.year == year) {
        res.entry(r.seccional).or_default().push(r);
    }
    for rows in res.values_mut() {
        rows.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.party.cmp(&b.party)));
    }
    res
}

pub fn winners_by_seccional(results: &[ElectoralResult], year: u32) -> Vec<Winner> {
    ranked_by_seccional(results, year)
        .into_iter()
        .filter_map(|(seccional, rows)| {
            let first = rows.first()?;
            let second_pct = rows.get(1).map(|r| r.percentage).unwrap_or(0.0);
            Some(Winner {
                year,
                seccional,
                party: first.party.clone(),
                votes: first.votes,
                percentage: first.percentage,
                margin: round2(first.percentage - second_pct),
            })
        })
        .collect()
}

/// Total votes cast in each year, over all the seccionales.
pub fn votes_by_year(results: &[ElectoralResult]) -> BTreeMap<u32, u64> {
    let mut res: BTreeMap<u32, u64> = BTreeMap::new();
    for r in results.iter() {
        let e = res.entry(r.year).or_insert(0);
        *e = e.saturating_add(r.votes);
    }
    res
}

fn votes_by_party(results: &[ElectoralResult], year: Option<u32>) -> BTreeMap<&str, u64> {
    let mut res: BTreeMap<&str, u64> = BTreeMap::new();
    for r in results.iter().filter(|r| year.map_or(true, |y| r.year == y)) {
        let e = res.entry(r.party.as_str()).or_insert(0);
        *e = e.saturating_add(r.votes);
    }
    res
}

/// The `n` parties with the most votes over all the years.
pub fn top_parties(results: &[ElectoralResult], n: usize) -> Vec<PartyTotal> {
    let mut totals: Vec<PartyTotal> = votes_by_party(results, None)
        .into_iter()
        .map(|(party, votes)| PartyTotal {
            party: party.to_string(),
            votes,
        })
        .collect();
    totals.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.party.cmp(&b.party)));
    totals.truncate(n);
    totals
}

/// City-wide growth of each party between consecutive years of the dataset.
pub fn growth_rates(results: &[ElectoralResult]) -> Vec<GrowthRate> {
    let ys = years(results);
    let mut res = Vec::new();
    for w in ys.windows(2) {
        let (from_year, to_year) = (w[0], w[1]);
        let before = votes_by_party(results, Some(from_year));
        let after = votes_by_party(results, Some(to_year));
        let parties: BTreeSet<&str> = before.keys().chain(after.keys()).cloned().collect();
        for p in parties {
            let from_votes = before.get(p).cloned().unwrap_or(0);
            let to_votes = after.get(p).cloned().unwrap_or(0);
            let growth = if from_votes == 0 {
                None
            } else {
                Some(round2(
                    (to_votes as f64 - from_votes as f64) / from_votes as f64 * 100.0,
                ))
            };
            res.push(GrowthRate {
                party: p.to_string(),
                from_year,
                to_year,
                from_votes,
                to_votes,
                growth,
            });
        }
    }
    res
}

fn city_shares(results: &[ElectoralResult], year: u32) -> BTreeMap<&str, f64> {
    let by_party = votes_by_party(results, Some(year));
    let total: u64 = by_party.values().fold(0, |acc, v| acc.saturating_add(*v));
    by_party
        .into_iter()
        .map(|(p, v)| {
            let share = if total == 0 {
                0.0
            } else {
                v as f64 / total as f64 * 100.0
            };
            (p, share)
        })
        .collect()
}

/// Pedersen electoral volatility between two years, in percentage points.
///
/// Half the sum of the absolute changes of the city-wide vote share of every
/// party. A party missing in one of the years counts with a share of 0.
pub fn pedersen_index(results: &[ElectoralResult], from: u32, to: u32) -> f64 {
    let before = city_shares(results, from);
    let after = city_shares(results, to);
    let parties: BTreeSet<&str> = before.keys().chain(after.keys()).cloned().collect();
    let total_change: f64 = parties
        .iter()
        .map(|p| {
            let b = before.get(p).cloned().unwrap_or(0.0);
            let a = after.get(p).cloned().unwrap_or(0.0);
            (a - b).abs()
        })
        .sum();
    round2(0.5 * total_change)
}

/// The seccionales where the first two parties are within `threshold`
/// percentage points. Seccionales with a single party are never competitive.
pub fn competitive_seccionales(
    results: &[ElectoralResult],
    year: u32,
    threshold: f64,
) -> Vec<Competitive> {
    ranked_by_seccional(results, year)
        .into_iter()
        .filter_map(|(seccional, rows)| {
            let (first, second) = match rows.as_slice() {
                [a, b, ..] => (*a, *b),
                _ => return None,
            };
            let margin = round2(first.percentage - second.percentage);
            if margin <= threshold {
                Some(Competitive {
                    year,
                    seccional,
                    first: first.party.clone(),
                    second: second.party.clone(),
                    margin,
                })
            } else {
                None
            }
        })
        .collect()
}

/// Herfindahl-Hirschman index of each seccional: the sum of the squared
/// percentages. 10000 means a single party took every vote.
pub fn concentration_index(results: &[ElectoralResult], year: u32) -> BTreeMap<SeccionalId, f64> {
    ranked_by_seccional(results, year)
        .into_iter()
        .map(|(seccional, rows)| {
            let hhi: f64 = rows.iter().map(|r| r.percentage * r.percentage).sum();
            (seccional, round2(hhi))
        })
        .collect()
}

/// Compares the winner of each seccional between two years.
pub fn vote_swing(results: &[ElectoralResult], from: u32, to: u32) -> Vec<Swing> {
    let before: BTreeMap<SeccionalId, String> = winners_by_seccional(results, from)
        .into_iter()
        .map(|w| (w.seccional, w.party))
        .collect();
    let after: BTreeMap<SeccionalId, String> = winners_by_seccional(results, to)
        .into_iter()
        .map(|w| (w.seccional, w.party))
        .collect();
    let seccionales: BTreeSet<SeccionalId> = before.keys().chain(after.keys()).cloned().collect();
    seccionales
        .into_iter()
        .map(|s| {
            let from_winner = before.get(&s).cloned();
            let to_winner = after.get(&s).cloned();
            let flipped = from_winner.is_some() && to_winner.is_some() && from_winner != to_winner;
            Swing {
                seccional: s,
                from_winner,
                to_winner,
                flipped,
            }
        })
        .collect()
}
