use serde::Deserialize;

/// Criterion used by the read/write router to rank eligible replicas when
/// picking one for a SLAVE-targeted statement (spec §4.3 Selection).
///
/// All four are a total order induced by dividing a raw load metric by the
/// backend's weight, so a backend with weight 2000 is "seen" as carrying
/// half the load of one with weight 1000 (see [`crate::shardwire::common::weighted_load`]).
#[derive(Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaveSelectionCriteria {
    LeastGlobalConnections,
    LeastRouterConnections,
    LeastBehindMaster,
    LeastCurrentOperations,
}

impl Default for SlaveSelectionCriteria {
    fn default() -> Self {
        SlaveSelectionCriteria::LeastCurrentOperations
    }
}

/// `max_slave_connections` may be given as an absolute count or as a
/// percentage of the configured replicas (spec §6 Recognized router options).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SlaveCount {
    Count(usize),
    Percent(u8),
}

impl SlaveCount {
    pub fn resolve(&self, total_replicas: usize) -> usize {
        match *self {
            SlaveCount::Count(n) => n.min(total_replicas),
            SlaveCount::Percent(p) => {
                let p = p.min(100) as usize;
                (total_replicas * p + 99) / 100
            }
        }
    }
}

impl Default for SlaveCount {
    fn default() -> Self {
        SlaveCount::Count(usize::MAX)
    }
}

impl<'de> Deserialize<'de> for SlaveCount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(usize),
            Str(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Int(n) => Ok(SlaveCount::Count(n)),
            Raw::Str(s) => {
                if let Some(pct) = s.strip_suffix('%') {
                    let p: u8 = pct.trim().parse().map_err(serde::de::Error::custom)?;
                    Ok(SlaveCount::Percent(p))
                } else {
                    s.parse::<usize>().map(SlaveCount::Count).map_err(serde::de::Error::custom)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_counts_and_percents() {
        assert_eq!(SlaveCount::Count(2).resolve(5), 2);
        assert_eq!(SlaveCount::Count(10).resolve(5), 5);
        assert_eq!(SlaveCount::Percent(50).resolve(5), 3);
        assert_eq!(SlaveCount::Percent(100).resolve(5), 5);
    }
}
