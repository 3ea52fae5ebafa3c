//! Tile and band selection of multi-part product files.
//!
//! Only granule files (paths containing [`GRANULE_MARKER`]) are subject to
//! filtering; every other file of the product is always kept. The filtering
//! itself is a table of stages chosen by which filters are present:
//!
//! | tiles | bands | stages                                              |
//! |-------|-------|-----------------------------------------------------|
//! | -     | -     | none (everything is kept)                           |
//! | -     | yes   | band                                                |
//! | yes   | -     | tile                                                |
//! | yes   | yes   | tile, band check, then tile-scoped band or tile     |
//! |       |       | metadata file                                       |
//!
//! Each stage narrows the granule files to those matching any of its
//! patterns. A check stage only requires a match and narrows nothing. A
//! stage that matches nothing makes the whole selection fall back to the
//! full, unfiltered manifest.

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::manifest::ManifestPart;

/// Path fragment identifying granule files.
pub const GRANULE_MARKER: &str = "GRANULE";

/// A filter token is not a valid regular expression.
#[derive(Debug, Error)]
#[error("invalid tile/band pattern '{pattern}': {source}")]
pub struct SelectorError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// One filtering stage: granule files matching any pattern survive.
#[derive(Debug, Clone)]
pub struct Stage {
    name: &'static str,
    patterns: Vec<Regex>,
    narrows: bool,
}

impl Stage {
    fn new(name: &'static str, sources: Vec<String>) -> Result<Self, SelectorError> {
        let patterns = sources
            .into_iter()
            .map(|pattern| {
                Regex::new(&pattern).map_err(|source| SelectorError { pattern, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name,
            patterns,
            narrows: true,
        })
    }

    /// A stage that must match some granule file but keeps them all.
    fn check(name: &'static str, sources: Vec<String>) -> Result<Self, SelectorError> {
        Ok(Self {
            narrows: false,
            ..Self::new(name, sources)?
        })
    }

    /// Stage name used in log output.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(path))
    }
}

/// Build the stage list for a tile/band filter combination.
pub fn rules_for(tiles: &[String], bands: &[String]) -> Result<Vec<Stage>, SelectorError> {
    let band_patterns = || bands.to_vec();
    let tile_patterns = || tiles.to_vec();

    match (tiles.is_empty(), bands.is_empty()) {
        (true, true) => Ok(Vec::new()),
        (true, false) => Ok(vec![Stage::new("band", band_patterns())?]),
        (false, true) => Ok(vec![Stage::new("tile", tile_patterns())?]),
        (false, false) => {
            let mut scoped = Vec::with_capacity(tiles.len() * (bands.len() + 1));
            for tile in tiles {
                scoped.push(format!(r"{}\.xml$", tile));
                for band in bands {
                    scoped.push(format!("{}.*{}", tile, band));
                }
            }
            Ok(vec![
                Stage::new("tile", tile_patterns())?,
                Stage::check("band", band_patterns())?,
                Stage::new("tile-scoped band", scoped)?,
            ])
        }
    }
}

/// Outcome of a part selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Selected parts, in manifest order.
    pub parts: Vec<ManifestPart>,
    /// `true` when the filters applied; `false` when no filter was given or
    /// a stage fell back to the full manifest.
    pub narrowed: bool,
}

/// Compiled tile/band filter for one sync request.
#[derive(Debug, Clone)]
pub struct PartSelector {
    stages: Vec<Stage>,
}

impl PartSelector {
    /// Compile the filter. Empty lists mean "no filter".
    pub fn new(tiles: &[String], bands: &[String]) -> Result<Self, SelectorError> {
        Ok(Self {
            stages: rules_for(tiles, bands)?,
        })
    }

    /// Select the parts to retrieve from a manifest.
    pub fn select(&self, parts: &[ManifestPart]) -> Selection {
        let unfiltered = || Selection {
            parts: parts.to_vec(),
            narrowed: false,
        };

        if self.stages.is_empty() {
            return unfiltered();
        }

        let mut kept: Vec<bool> = parts
            .iter()
            .map(|part| is_granule(&part.relative_path))
            .collect();

        for stage in &self.stages {
            let mut any = false;
            for (keep, part) in kept.iter_mut().zip(parts) {
                if *keep {
                    let matched = stage.matches(&part.relative_path);
                    if stage.narrows {
                        *keep = matched;
                    }
                    any |= matched;
                }
            }
            if !any {
                debug!(stage = stage.name(), "No granule file matches, keeping the whole product");
                return unfiltered();
            }
        }

        let selected: Vec<ManifestPart> = parts
            .iter()
            .zip(&kept)
            .filter(|(part, keep)| **keep || !is_granule(&part.relative_path))
            .map(|(part, _)| part.clone())
            .collect();

        debug!(before = parts.len(), after = selected.len(), "Filtered product files");
        Selection {
            parts: selected,
            narrowed: true,
        }
    }
}

fn is_granule(path: &str) -> bool {
    path.contains(GRANULE_MARKER)
}

/// Select parts for the given tile and band filters.
pub fn select(
    parts: &[ManifestPart],
    tiles: &[String],
    bands: &[String],
) -> Result<Selection, SelectorError> {
    Ok(PartSelector::new(tiles, bands)?.select(parts))
}

/// Split a comma-separated filter list, ignoring spaces and empty items.
pub fn parse_filter_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn part(path: &str) -> ManifestPart {
        ManifestPart::new(path, "00")
    }

    fn manifest() -> Vec<ManifestPart> {
        vec![
            part("./MTD_MSIL1C.xml"),
            part("./GRANULE/L1C_T31TEJ_A1/MTD_TL_T31TEJ.xml"),
            part("./GRANULE/L1C_T31TEJ_A1/IMG_DATA/T31TEJ_20160218_B01.jp2"),
            part("./GRANULE/L1C_T31TEJ_A1/IMG_DATA/T31TEJ_20160218_B02.jp2"),
            part("./GRANULE/L1C_T31TDJ_A1/IMG_DATA/T31TDJ_20160218_B01.jp2"),
            part("./GRANULE/L1C_T31TDJ_A1/IMG_DATA/T31TDJ_20160218_B02.jp2"),
            part("./HTML/UserProduct_index.html"),
        ]
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn paths(selection: &Selection) -> Vec<&str> {
        selection
            .parts
            .iter()
            .map(|p| p.relative_path.as_str())
            .collect()
    }

    #[test]
    fn test_no_filters_returns_everything() {
        let selection = select(&manifest(), &[], &[]).unwrap();
        assert_eq!(selection.parts, manifest());
        assert!(!selection.narrowed);
    }

    #[test]
    fn test_unknown_tile_falls_back_to_all_parts() {
        let selection = select(&manifest(), &strings(&["T99ZZZ"]), &[]).unwrap();
        assert_eq!(selection.parts, manifest());
        assert!(!selection.narrowed);
    }

    #[test]
    fn test_tile_filter_keeps_non_granule_parts() {
        let selection = select(&manifest(), &strings(&["T31TDJ"]), &[]).unwrap();

        assert!(selection.narrowed);
        assert_eq!(
            paths(&selection),
            vec![
                "./MTD_MSIL1C.xml",
                "./GRANULE/L1C_T31TDJ_A1/IMG_DATA/T31TDJ_20160218_B01.jp2",
                "./GRANULE/L1C_T31TDJ_A1/IMG_DATA/T31TDJ_20160218_B02.jp2",
                "./HTML/UserProduct_index.html",
            ]
        );
    }

    #[test]
    fn test_band_filter() {
        let selection = select(&manifest(), &[], &strings(&["B02"])).unwrap();

        assert!(selection.narrowed);
        assert_eq!(
            paths(&selection),
            vec![
                "./MTD_MSIL1C.xml",
                "./GRANULE/L1C_T31TEJ_A1/IMG_DATA/T31TEJ_20160218_B02.jp2",
                "./GRANULE/L1C_T31TDJ_A1/IMG_DATA/T31TDJ_20160218_B02.jp2",
                "./HTML/UserProduct_index.html",
            ]
        );
    }

    #[test]
    fn test_unknown_band_falls_back() {
        let selection = select(&manifest(), &[], &strings(&["B12"])).unwrap();
        assert_eq!(selection.parts, manifest());
        assert!(!selection.narrowed);
    }

    #[test]
    fn test_tiles_and_bands_keep_tile_metadata() {
        let selection = select(&manifest(), &strings(&["T31TEJ"]), &strings(&["B01"])).unwrap();

        assert!(selection.narrowed);
        assert_eq!(
            paths(&selection),
            vec![
                "./MTD_MSIL1C.xml",
                "./GRANULE/L1C_T31TEJ_A1/MTD_TL_T31TEJ.xml",
                "./GRANULE/L1C_T31TEJ_A1/IMG_DATA/T31TEJ_20160218_B01.jp2",
                "./HTML/UserProduct_index.html",
            ]
        );
    }

    #[test]
    fn test_unmatched_band_in_matched_tile_falls_back() {
        let selection = select(&manifest(), &strings(&["T31TEJ"]), &strings(&["B12"])).unwrap();

        // The tile metadata file alone does not count as a band match
        assert!(!selection.narrowed);
        assert_eq!(selection.parts, manifest());
    }

    #[test]
    fn test_band_of_other_tile_does_not_narrow() {
        let parts = vec![
            part("./MTD_MSIL1C.xml"),
            part("./GRANULE/L1C_T31TEJ_A1/MTD_TL_T31TEJ.xml"),
            part("./GRANULE/L1C_T31TEJ_A1/IMG_DATA/T31TEJ_20160218_B01.jp2"),
            part("./GRANULE/L1C_T31TDJ_A1/IMG_DATA/T31TDJ_20160218_B12.jp2"),
        ];
        let selection = select(&parts, &strings(&["T31TEJ"]), &strings(&["B12"])).unwrap();

        assert!(!selection.narrowed);
        assert_eq!(selection.parts, parts);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let err = PartSelector::new(&strings(&["T31("]), &[]).unwrap_err();
        assert_eq!(err.pattern, "T31(");
    }

    #[test]
    fn test_rules_table_shape() {
        let t = strings(&["T31TEJ", "T31TDJ"]);
        let b = strings(&["B01"]);

        assert!(rules_for(&[], &[]).unwrap().is_empty());
        assert_eq!(rules_for(&[], &b).unwrap().len(), 1);
        assert_eq!(rules_for(&t, &[]).unwrap().len(), 1);

        let both = rules_for(&t, &b).unwrap();
        assert_eq!(
            both.iter().map(Stage::name).collect::<Vec<_>>(),
            vec!["tile", "band", "tile-scoped band"]
        );
    }

    #[test]
    fn test_parse_filter_list() {
        assert_eq!(
            parse_filter_list("T31TGJ, T31TGK ,T31TDL"),
            strings(&["T31TGJ", "T31TGK", "T31TDL"])
        );
        assert!(parse_filter_list("").is_empty());
        assert!(parse_filter_list(" , ").is_empty());
    }

    proptest! {
        #[test]
        fn prop_selection_is_never_empty_for_non_empty_manifest(
            tile in "T[0-9]{2}[A-Z]{3}",
            band in "B[0-9]{2}",
        ) {
            let selection = select(&manifest(), &[tile], &[band]).unwrap();
            prop_assert!(!selection.parts.is_empty());
        }

        #[test]
        fn prop_non_granule_parts_always_kept(
            tile in "T[0-9]{2}[A-Z]{3}",
            band in proptest::option::of("B[0-9]{2}"),
        ) {
            let bands: Vec<String> = band.into_iter().collect();
            let selection = select(&manifest(), &[tile], &bands).unwrap();
            for p in manifest().iter().filter(|p| !p.relative_path.contains(GRANULE_MARKER)) {
                prop_assert!(selection.parts.contains(p));
            }
        }
    }
}
