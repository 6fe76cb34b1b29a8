//! Time-series containers.
//!
//! - `TimeSeries`: values from one model run, sorted by valid time
//! - `EnsembleList` / `EnsembleSeries`: several runs keyed by init time
//! - `MergedSeries`: one value per valid time, taken from the run with the
//!   shortest lead time

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{Duration, NaiveDateTime};

use crate::domain::MetaData;

/// Something valid at a single point in time.
pub trait ValidTime {
    fn valid_time(&self) -> Option<NaiveDateTime>;
}

/// A forecast value: valid at a time, and some lead time after its model run.
pub trait ModelTimes: ValidTime {
    fn lead_time(&self) -> Option<Duration>;
}

// Assumes all items in the vector share a valid time.
impl<T: ValidTime> ValidTime for Vec<T> {
    fn valid_time(&self) -> Option<NaiveDateTime> {
        self.first().and_then(|t| t.valid_time())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries<T: ValidTime> {
    data: Vec<T>,
}

impl<T: ValidTime> TimeSeries<T> {
    /// Build a series, sorting by valid time. Items without a valid time sort first.
    pub fn new(mut data: Vec<T>) -> Self {
        data.sort_by_key(|t| t.valid_time());
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_inner(self) -> Vec<T> {
        self.data
    }
}

impl<T: ValidTime> AsRef<[T]> for TimeSeries<T> {
    fn as_ref(&self) -> &[T] {
        &self.data
    }
}

/// A `MetaData` plus one item per model initialization time.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleList<T> {
    pub meta: MetaData,
    pub data: Vec<(NaiveDateTime, T)>,
}

/// An `EnsembleList` whose members are time series.
pub type EnsembleSeries<T> = EnsembleList<TimeSeries<T>>;

/// A `MetaData` plus a single time series.
///
/// Either a single run, or an ensemble collapsed by `EnsembleSeries::merge`.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSeries<T: ValidTime> {
    pub meta: MetaData,
    pub data: TimeSeries<T>,
}

impl<T> EnsembleList<T> {
    /// Map each member, dropping the ones that map to `None`.
    pub fn filter_map<U, F>(&self, func: F) -> EnsembleList<U>
    where
        F: Fn(&T) -> Option<U>,
    {
        let data = self
            .data
            .iter()
            .filter_map(|(init_time, t)| func(t).map(|u| (*init_time, u)))
            .collect();

        EnsembleList {
            meta: self.meta.clone(),
            data,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn init_times(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.data.iter().map(|(init_time, _)| *init_time)
    }

    /// Order members by ascending initialization time. Stable for equal times.
    pub fn sort_by_init_time(&mut self) {
        self.data.sort_by_key(|(init_time, _)| *init_time);
    }
}

impl<T: ValidTime> EnsembleSeries<T> {
    /// Map every value of every member; members left empty are dropped.
    pub fn filter_map_inner<U, F>(&self, func: F) -> EnsembleSeries<U>
    where
        F: Fn(&T) -> Option<U>,
        U: ValidTime,
    {
        let data = self
            .data
            .iter()
            .filter_map(|(init_time, series)| {
                let inner: Vec<U> = series.as_ref().iter().filter_map(&func).collect();
                if inner.is_empty() {
                    None
                } else {
                    Some((*init_time, TimeSeries::new(inner)))
                }
            })
            .collect();

        EnsembleSeries {
            meta: self.meta.clone(),
            data,
        }
    }

    /// Total number of values across members.
    pub fn value_count(&self) -> usize {
        self.data.iter().map(|(_, s)| s.len()).sum()
    }
}

impl<T: ModelTimes> EnsembleSeries<T> {
    /// Collapse the ensemble into one series.
    ///
    /// For each valid time the value with the shortest lead time wins. On a tie
    /// the member that comes first (earliest init time once sorted) is kept.
    /// Values without a valid or lead time are dropped.
    pub fn merge(self) -> MergedSeries<T> {
        let EnsembleSeries { meta, data } = self;

        let mut pool: BTreeMap<NaiveDateTime, (Duration, T)> = BTreeMap::new();

        for (_init_time, series) in data {
            for val in series.into_inner() {
                let (Some(valid_time), Some(lead_time)) = (val.valid_time(), val.lead_time()) else {
                    continue;
                };
                match pool.entry(valid_time) {
                    Entry::Occupied(mut entry) => {
                        if lead_time < entry.get().0 {
                            entry.insert((lead_time, val));
                        }
                    }
                    Entry::Vacant(entry) => {
                        entry.insert((lead_time, val));
                    }
                }
            }
        }

        let data = pool.into_values().map(|(_, val)| val).collect();

        MergedSeries {
            meta,
            data: TimeSeries::new(data),
        }
    }
}

impl<T: ValidTime> MergedSeries<T> {
    /// Map each value, dropping the ones that map to `None`.
    pub fn filter_map<U, F>(&self, func: F) -> MergedSeries<U>
    where
        F: Fn(&T) -> Option<U>,
        U: ValidTime,
    {
        let data = self.data.as_ref().iter().filter_map(func).collect();
        MergedSeries {
            meta: self.meta.clone(),
            data: TimeSeries::new(data),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalyzedData, Site};
    use chrono::NaiveDate;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 9, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn meta() -> MetaData {
        MetaData {
            site: Site::new("kmso"),
            model: "gfs".to_string(),
            start: at(1, 0),
            now: at(2, 0),
            end: at(8, 0),
        }
    }

    fn row(init: NaiveDateTime, valid: NaiveDateTime, hdw: f64) -> AnalyzedData {
        AnalyzedData {
            valid_time: valid,
            lead_time: (valid - init).num_hours() as i32,
            hdw,
            t0: f64::NAN,
            dt0: f64::NAN,
            e0: f64::NAN,
            de: f64::NAN,
        }
    }

    fn run(init: NaiveDateTime, hours: &[u32], hdw: f64) -> (NaiveDateTime, TimeSeries<AnalyzedData>) {
        let rows = hours
            .iter()
            .map(|h| row(init, init + Duration::hours(i64::from(*h)), hdw))
            .collect();
        (init, TimeSeries::new(rows))
    }

    #[test]
    fn merge_prefers_shortest_lead_time() {
        let ens = EnsembleSeries {
            meta: meta(),
            data: vec![
                run(at(1, 0), &[0, 6, 12, 18, 24], 1.0),
                run(at(1, 12), &[0, 6, 12, 18], 2.0),
            ],
        };

        let merged = ens.merge();
        let values: Vec<(NaiveDateTime, f64)> = merged
            .data
            .as_ref()
            .iter()
            .map(|r| (r.valid_time, r.hdw))
            .collect();

        assert_eq!(
            values,
            vec![
                (at(1, 0), 1.0),
                (at(1, 6), 1.0),
                (at(1, 12), 2.0),
                (at(1, 18), 2.0),
                (at(2, 0), 2.0),
                (at(2, 6), 2.0),
            ]
        );
    }

    #[test]
    fn merge_tie_keeps_first_member() {
        let init = at(1, 0);
        let ens = EnsembleSeries {
            meta: meta(),
            data: vec![run(init, &[0, 6], 1.0), run(init, &[6], 9.0)],
        };
        let merged = ens.merge();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.data.as_ref()[1].hdw, 1.0);
    }

    #[test]
    fn filter_map_inner_drops_empty_members() {
        let ens = EnsembleSeries {
            meta: meta(),
            data: vec![run(at(1, 0), &[0, 6], 1.0), run(at(1, 12), &[0], 5.0)],
        };
        let high = ens.filter_map_inner(|r| if r.hdw > 2.0 { Some(r.clone()) } else { None });
        assert_eq!(high.len(), 1);
        assert_eq!(high.data[0].0, at(1, 12));
        assert_eq!(ens.value_count(), 3);
    }

    #[test]
    fn sort_by_init_time_orders_members() {
        let mut ens = EnsembleSeries {
            meta: meta(),
            data: vec![run(at(2, 0), &[0], 1.0), run(at(1, 0), &[0], 1.0)],
        };
        ens.sort_by_init_time();
        let inits: Vec<_> = ens.init_times().collect();
        assert_eq!(inits, vec![at(1, 0), at(2, 0)]);
    }

    #[test]
    fn vec_valid_time_uses_first_item() {
        let v = vec![row(at(1, 0), at(1, 6), 1.0), row(at(1, 0), at(1, 12), 1.0)];
        assert_eq!(v.valid_time(), Some(at(1, 6)));
        let empty: Vec<AnalyzedData> = Vec::new();
        assert_eq!(empty.valid_time(), None);
    }
}
