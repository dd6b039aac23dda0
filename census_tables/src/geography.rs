//! The static geography of a run: which entities are the national and state
//! levels, how municipalities group into regions, and which periods count.

use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::config::*;

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Region {
    pub name: String,
    /// Municipality codes, in the configured order.
    pub municipalities: Vec<String>,
}

/// Regions of a state. Every municipality belongs to at most one region.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RegionMap {
    regions: Vec<Region>,
    index: HashMap<String, usize>,
}

impl RegionMap {
    pub fn new(regions: Vec<Region>) -> Result<RegionMap, GeographyError> {
        let mut index: HashMap<String, usize> = HashMap::new();
        for (idx, region) in regions.iter().enumerate() {
            if regions[..idx].iter().any(|r| r.name == region.name) {
                return Err(GeographyError::DuplicateRegion(region.name.clone()));
            }
            if region.municipalities.is_empty() {
                return Err(GeographyError::EmptyRegion(region.name.clone()));
            }
            for m in region.municipalities.iter() {
                if let Some(first) = index.insert(m.clone(), idx) {
                    return Err(GeographyError::DuplicateMunicipality {
                        municipality: m.clone(),
                        first_region: regions[first].name.clone(),
                        second_region: region.name.clone(),
                    });
                }
            }
        }
        debug!("RegionMap::new: {} regions, {} municipalities", regions.len(), index.len());
        Ok(RegionMap { regions, index })
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region_of(&self, municipality: &str) -> Option<&Region> {
        self.index.get(municipality).map(|idx| &self.regions[*idx])
    }

    /// The municipalities of the given set that no region covers, sorted.
    pub fn uncovered<'a, I>(&self, municipalities: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        municipalities
            .into_iter()
            .filter(|m| self.region_of(m).is_none())
            .cloned()
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect()
    }
}

/// The census years taken into account, ascending.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct PeriodSet {
    years: Vec<i32>,
}

impl PeriodSet {
    pub fn new(mut years: Vec<i32>) -> PeriodSet {
        years.sort_unstable();
        years.dedup();
        PeriodSet { years }
    }

    /// Drops the years before `minimum`.
    pub fn with_floor(self, minimum: i32) -> PeriodSet {
        PeriodSet {
            years: self.years.into_iter().filter(|y| *y >= minimum).collect(),
        }
    }

    pub fn contains(&self, year: i32) -> bool {
        self.years.binary_search(&year).is_ok()
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Geography {
    /// Entity of the national aggregate records, e.g. `00 Total Nacional`.
    pub national_entity: String,
    pub state_entity: String,
    pub regions: RegionMap,
    pub periods: PeriodSet,
}

impl Geography {
    /// The level a record belongs to, or `None` when the record is not part
    /// of the hierarchy (another state, a period out of the set).
    pub fn level(&self, record: &CensusRecord) -> Option<GeoLevel> {
        if !self.periods.contains(record.period) {
            return None;
        }
        let municipality = record
            .municipality
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty());
        match municipality {
            None if record.entity == self.national_entity => Some(GeoLevel::National),
            None if record.entity == self.state_entity => Some(GeoLevel::State),
            Some(m) if record.entity == self.state_entity => {
                Some(GeoLevel::Municipal(m.to_string()))
            }
            _ => None,
        }
    }
}
