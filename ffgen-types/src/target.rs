use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// The cores the generator knows how to target.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    strum::Display,
    strum::EnumString,
    clap::ValueEnum,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Sgx530,
    #[default]
    Sgx535,
    Sgx540,
    Sgx543,
    Sgx545,
    /// Portable intermediate form consumed by a downstream shader compiler.
    Uniflex,
}

/// The region of the secondary attribute bank that supports runtime indexing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexableWindow {
    /// First secondary attribute of the window.
    pub base: u32,
    /// Size of the window in words.
    pub words: u32,
}

/// How a matrix-vector product is lowered on a core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum MatrixLowering {
    /// One scalar dot product per row.
    Dot,
    /// A single repeated vector dot product.
    Vector,
    /// Paired fused multiply-accumulates chained through internal registers.
    Efo,
}

/// What the instruction selector needs to know about a core.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    pub vector_dot_product: bool,
    pub efo: bool,
    /// Instructions searched backwards for one that can take the no-reschedule flag.
    pub no_sched_lookback: u32,
    /// No-ops inserted when nothing in the lookback window can take the flag.
    pub no_sched_padding: u32,
    /// Temporaries below this word offset alias the channel a repeated dot product accumulates
    /// through. Dot products writing there run with destination auto-increment turned off.
    pub dot_alias_limit: Option<u32>,
    pub indexable: Option<IndexableWindow>,
    /// Largest byte offset a load can encode as an immediate.
    pub load_immediate_bytes: u32,
    /// Largest number of words fetched by one load.
    pub fetch_burst_words: u32,
    pub data_ready_channels: u32,
    pub max_secondary_attributes: u32,
    pub max_temporaries: u32,
}

impl Capabilities {
    fn base() -> Self {
        Capabilities {
            vector_dot_product: false,
            efo: false,
            no_sched_lookback: 1,
            no_sched_padding: 1,
            dot_alias_limit: None,
            indexable: None,
            load_immediate_bytes: 252,
            fetch_burst_words: 16,
            data_ready_channels: 2,
            max_secondary_attributes: 128,
            max_temporaries: 64,
        }
    }

    pub fn for_target(target: Target) -> Self {
        let indexable = Some(IndexableWindow {
            base: 128,
            words: 128,
        });
        match target {
            Target::Sgx530 => Capabilities {
                dot_alias_limit: Some(4),
                ..Capabilities::base()
            },
            Target::Sgx535 => Capabilities {
                efo: true,
                no_sched_lookback: 1,
                no_sched_padding: 2,
                indexable,
                max_secondary_attributes: 256,
                ..Capabilities::base()
            },
            Target::Sgx540 => Capabilities {
                efo: true,
                no_sched_lookback: 3,
                no_sched_padding: 1,
                indexable,
                max_secondary_attributes: 256,
                max_temporaries: 96,
                ..Capabilities::base()
            },
            Target::Sgx543 => Capabilities {
                vector_dot_product: true,
                indexable,
                max_secondary_attributes: 256,
                max_temporaries: 128,
                ..Capabilities::base()
            },
            Target::Sgx545 => Capabilities {
                efo: true,
                no_sched_lookback: 1,
                no_sched_padding: 2,
                indexable,
                max_secondary_attributes: 256,
                max_temporaries: 128,
                ..Capabilities::base()
            },
            Target::Uniflex => Capabilities {
                max_secondary_attributes: 256,
                max_temporaries: 256,
                ..Capabilities::base()
            },
        }
    }

    /// Picks the lowering for a matrix with `cols` columns producing `rows` rows.
    pub fn matrix_lowering(&self, rows: u32, cols: u32) -> MatrixLowering {
        if self.vector_dot_product && cols >= 3 {
            MatrixLowering::Vector
        } else if self.efo && cols == 4 && rows >= 3 {
            MatrixLowering::Efo
        } else {
            MatrixLowering::Dot
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_target_has_a_sane_table() {
        for target in Target::iter() {
            let caps = Capabilities::for_target(target);
            assert!(caps.fetch_burst_words > 0, "{target}");
            assert!(caps.data_ready_channels > 0, "{target}");
            if caps.efo {
                assert!(caps.no_sched_lookback >= 1 && caps.no_sched_lookback <= 3);
                assert!(caps.no_sched_padding >= 1 && caps.no_sched_padding <= 2);
            }
            if let Some(window) = caps.indexable {
                assert!(window.base + window.words <= caps.max_secondary_attributes);
            }
        }
    }

    #[test]
    fn lowering_choice() {
        let caps = Capabilities::for_target(Target::Sgx543);
        assert_eq!(caps.matrix_lowering(4, 4), MatrixLowering::Vector);
        let caps = Capabilities::for_target(Target::Sgx535);
        assert_eq!(caps.matrix_lowering(4, 4), MatrixLowering::Efo);
        assert_eq!(caps.matrix_lowering(3, 3), MatrixLowering::Dot);
        let caps = Capabilities::for_target(Target::Sgx530);
        assert_eq!(caps.matrix_lowering(4, 4), MatrixLowering::Dot);
    }

    #[test]
    fn only_the_dot_product_core_has_an_alias_window() {
        for target in Target::iter() {
            let caps = Capabilities::for_target(target);
            assert_eq!(
                caps.dot_alias_limit.is_some(),
                target == Target::Sgx530,
                "{target}"
            );
        }
    }

    #[test]
    fn targets_parse_by_name() {
        assert_eq!("sgx540".parse::<Target>().unwrap(), Target::Sgx540);
        assert_eq!(Target::Uniflex.to_string(), "uniflex");
    }
}
