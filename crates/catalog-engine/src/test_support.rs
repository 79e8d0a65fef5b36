//! Volume fixtures shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{CatalogError, CatalogResult};
use crate::loader::FragmentSource;
use crate::volume::Volume;

pub fn volume_from(document: Value) -> Volume {
    Volume::from_document(document).expect("fixture volume")
}

/// market → manufacturer → model, with one market whose manufacturers are
/// missing a sort number.
pub fn simple_document() -> Value {
    json!({
        "MMdM": {
            "display_config": {
                "volume_type": "wheel_hierarchical",
                "volume_name": "motors",
                "hierarchy_levels": {
                    "market": { "display_name": "Market" },
                    "manufacturer": { "text_format": "{{name}} ({{data.founded}})" },
                    "model": {}
                }
            },
            "markets": {
                "EU": {
                    "sort_number": 1,
                    "manufacturers": {
                        "Zenith": { "sort_number": 2, "founded": 1911, "models": [
                            { "model": "Z1", "sort_number": 1 }
                        ]},
                        "Acme": { "sort_number": 1, "founded": 1901, "models": [
                            { "model": "A2", "sort_number": 2 },
                            { "model": "A1", "sort_number": 1 }
                        ]}
                    }
                },
                "US": {
                    "sort_number": 2,
                    "manufacturers": {
                        "Dodge": { "sort_number": 1, "models": [] },
                        "Broken": { "models": [] }
                    }
                },
                "JP": {
                    "sort_number": 3,
                    "manufacturers": {
                        "Honda": { "sort_number": 1, "models": [
                            { "model": "Civic", "sort_number": 1 }
                        ]}
                    }
                }
            }
        }
    })
}

pub fn simple_volume() -> Volume {
    volume_from(simple_document())
}

/// market → country → manufacturer → cylinder → family (pseudo) →
/// subfamily (pseudo) → model.
pub fn motor_document() -> Value {
    json!({
        "MMdM": {
            "display_config": {
                "volume_type": "wheel_hierarchical",
                "structure_type": "monolithic",
                "volume_schema_version": "2.0",
                "volume_data_version": "2024.10",
                "hierarchy_levels": {
                    "market": {},
                    "country": {},
                    "manufacturer": {},
                    "cylinder": {
                        "is_numeric": true,
                        "supports_pseudo_parents": ["family", "subfamily"]
                    },
                    "family": {
                        "is_pseudo_parent": true,
                        "pseudo_parent_sort": { "Duratec": 1, "Zetec": 2 }
                    },
                    "subfamily": {
                        "is_pseudo_parent": true,
                        "pseudo_parent_sort": { "HE": 1 }
                    },
                    "model": {}
                },
                "leaf_level": "model"
            },
            "markets": {
                "EU": {
                    "sort_number": 1,
                    "countries": {
                        "Germany": {
                            "sort_number": 1,
                            "manufacturers": {
                                "Ford": {
                                    "sort_number": 1,
                                    "cylinders": {
                                        "4": {
                                            "sort_number": 1,
                                            "models": [
                                                { "model": "Focus ST", "sort_number": 1,
                                                  "rpp_family": true, "family": "Duratec",
                                                  "rpp_subfamily": true, "subfamily": "HE" },
                                                { "model": "Mondeo", "sort_number": 2,
                                                  "rpp_family": true, "family": "Duratec",
                                                  "rpp_subfamily": true, "subfamily": "HE" },
                                                { "model": "Fiesta", "sort_number": 3,
                                                  "rpp_family": true, "family": "Zetec" },
                                                { "model": "Ka", "sort_number": 4 }
                                            ]
                                        },
                                        "6": {
                                            "sort_number": 2,
                                            "models": [
                                                { "model": "Scorpio", "sort_number": 1 },
                                                { "model": "Granada", "sort_number": 2 }
                                            ]
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

pub fn motor_volume() -> Volume {
    volume_from(motor_document())
}

/// year → season (virtual) → day.
pub fn seasonal_volume() -> Volume {
    volume_from(json!({
        "Almanac": {
            "display_config": {
                "volume_type": "wheel_hierarchical",
                "hierarchy_levels": {
                    "year": {},
                    "season": {
                        "is_virtual": true,
                        "virtual_grouping_property": "season",
                        "virtual_membership_property": "in_season"
                    },
                    "day": {}
                }
            },
            "years": {
                "2024": {
                    "sort_number": 1,
                    "days": {
                        "d1": { "sort_number": 1, "in_season": true, "season": "Spring",
                                "rcj_season_sort_number": 1 },
                        "d2": { "sort_number": 2, "in_season": true, "season": "Spring" },
                        "d3": { "sort_number": 3, "in_season": true, "season": "Spring" },
                        "d4": { "sort_number": 4 },
                        "d5": { "sort_number": 5, "in_season": false, "season": "Summer" }
                    }
                },
                "2025": {
                    "sort_number": 2,
                    "days": {
                        "w1": { "sort_number": 2, "in_season": true, "season": "Winter",
                                "rcj_season_sort_number": 4 },
                        "a1": { "sort_number": 1, "in_season": true, "season": "Autumn",
                                "rcj_season_sort_number": 3 }
                    }
                },
                "2023": {
                    "sort_number": 0,
                    "days": {
                        "x1": { "sort_number": 1 },
                        "x2": { "sort_number": 2 }
                    }
                }
            }
        }
    }))
}

/// testament → book → chapter → verse, verses aggregated across chapters.
/// With `inline_verses` false the chapters only point at their fragments.
pub fn scripture_document(structure: &str, inline_verses: bool) -> Value {
    let chapter = |book: &str, number: u32, verses: Value| {
        let mut record = json!({
            "sort_number": number,
            "external_file": format!("data/{book}/chapter{number}.json"),
        });
        if inline_verses {
            record["verses"] = verses;
        }
        record
    };
    json!({
        "Gutenberg": {
            "display_config": {
                "volume_type": "wheel_hierarchical",
                "volume_name": "gutenberg",
                "structure_type": structure,
                "volume_schema_version": "1",
                "volume_data_version": "7",
                "hierarchy_levels": {
                    "testament": {},
                    "book": {},
                    "chapter": { "is_numeric": true },
                    "verse": { "aggregates_across": "chapter" }
                }
            },
            "testaments": {
                "OT": {
                    "sort_number": 1,
                    "books": {
                        "Psalms": {
                            "sort_number": 2,
                            "chapters": {
                                "2": chapter("psalms", 2, verse_fragment(&["Quare fremuerunt"])["verses"].clone()),
                                "1": chapter("psalms", 1, verse_fragment(&["Beatus vir", "Sed in lege"])["verses"].clone())
                            }
                        },
                        "Genesis": {
                            "sort_number": 1,
                            "chapters": {
                                "1": chapter("genesis", 1, verse_fragment(&["In principio", "Terra autem", "Dixitque"])["verses"].clone())
                            }
                        }
                    }
                }
            }
        }
    })
}

/// A chapter fragment holding one verse per text, numbered from 1.
pub fn verse_fragment(texts: &[&str]) -> Value {
    let verses: serde_json::Map<String, Value> = texts
        .iter()
        .enumerate()
        .map(|(index, text)| {
            (
                (index + 1).to_string(),
                json!({ "sequence": index + 1, "text": { "VUL": text } }),
            )
        })
        .collect();
    json!({ "verses": verses })
}

pub fn scripture_volume(inline_verses: bool) -> Volume {
    volume_from(scripture_document("monolithic", inline_verses))
}

/// Serves fixed documents and counts every fetch.
pub struct MapSource {
    documents: HashMap<String, Value>,
    fetches: AtomicUsize,
    delay: Duration,
}

impl MapSource {
    pub fn new(documents: impl IntoIterator<Item = (&'static str, Value)>) -> Arc<Self> {
        Arc::new(Self {
            documents: documents
                .into_iter()
                .map(|(path, value)| (path.to_string(), value))
                .collect(),
            fetches: AtomicUsize::new(0),
            delay: Duration::from_millis(10),
        })
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FragmentSource for MapSource {
    async fn fetch(&self, path: &str) -> CatalogResult<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.documents.get(path).cloned().ok_or_else(|| CatalogError::Fetch {
            path: path.to_string(),
            message: "not found".to_string(),
        })
    }
}
