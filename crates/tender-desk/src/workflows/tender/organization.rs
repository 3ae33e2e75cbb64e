use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Direction {
    pub code: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Division {
    pub code: &'static str,
    pub name: &'static str,
    pub direction_code: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("unknown division '{0}'")]
    UnknownDivision(String),
    #[error("division '{division}' references unknown direction '{direction}'")]
    DanglingParent { division: String, direction: String },
}

/// Immutable Direction/Division hierarchy.
#[derive(Debug)]
pub struct OrganizationDirectory {
    directions: BTreeMap<&'static str, Direction>,
    divisions: BTreeMap<&'static str, Division>,
}

impl OrganizationDirectory {
    /// Directory shared by the whole process, built on first use.
    pub fn standard() -> &'static Self {
        static DIRECTORY: OnceLock<OrganizationDirectory> = OnceLock::new();
        DIRECTORY.get_or_init(|| Self::from_tables(standard_directions(), standard_divisions()))
    }

    /// Builds a directory from explicit tables, rejecting any division whose
    /// direction is not listed.
    pub fn new(directions: Vec<Direction>, divisions: Vec<Division>) -> Result<Self, DirectoryError> {
        if let Some(orphan) = divisions.iter().find(|division| {
            !directions
                .iter()
                .any(|direction| direction.code == division.direction_code)
        }) {
            return Err(DirectoryError::DanglingParent {
                division: orphan.code.to_string(),
                direction: orphan.direction_code.to_string(),
            });
        }
        Ok(Self::from_tables(directions, divisions))
    }

    fn from_tables(directions: Vec<Direction>, divisions: Vec<Division>) -> Self {
        let directions = directions
            .into_iter()
            .map(|direction| (direction.code, direction))
            .collect();
        let divisions = divisions
            .into_iter()
            .map(|division| (division.code, division))
            .collect();

        Self {
            directions,
            divisions,
        }
    }

    pub fn resolve_direction(&self, division_code: &str) -> Result<&'static str, DirectoryError> {
        self.divisions
            .get(division_code)
            .map(|division| division.direction_code)
            .ok_or_else(|| DirectoryError::UnknownDivision(division_code.to_string()))
    }

    /// Division codes under `direction_code`, sorted. Empty for unknown codes.
    pub fn divisions_of(&self, direction_code: &str) -> Vec<&'static str> {
        self.divisions
            .values()
            .filter(|division| division.direction_code == direction_code)
            .map(|division| division.code)
            .collect()
    }

    pub fn direction(&self, code: &str) -> Option<&Direction> {
        self.directions.get(code)
    }

    pub fn division(&self, code: &str) -> Option<&Division> {
        self.divisions.get(code)
    }

    /// Directions ordered by code.
    pub fn directions(&self) -> impl Iterator<Item = &Direction> {
        self.directions.values()
    }

    /// Divisions ordered by code.
    pub fn divisions(&self) -> impl Iterator<Item = &Division> {
        self.divisions.values()
    }
}

fn standard_directions() -> Vec<Direction> {
    vec![
        Direction {
            code: "DAF",
            name: "Direction des Affaires Financières",
        },
        Direction {
            code: "DAJ",
            name: "Direction des Affaires Juridiques",
        },
        Direction {
            code: "DEP",
            name: "Direction des Études et de la Planification",
        },
        Direction {
            code: "DIE",
            name: "Direction des Infrastructures et de l'Équipement",
        },
        Direction {
            code: "DRH",
            name: "Direction des Ressources Humaines",
        },
    ]
}

fn standard_divisions() -> Vec<Division> {
    vec![
        Division {
            code: "DSI",
            name: "Division des Systèmes d'Information",
            direction_code: "DAF",
        },
        Division {
            code: "DBC",
            name: "Division du Budget et de la Comptabilité",
            direction_code: "DAF",
        },
        Division {
            code: "DMG",
            name: "Division des Moyens Généraux",
            direction_code: "DAF",
        },
        Division {
            code: "DCX",
            name: "Division du Contentieux",
            direction_code: "DAJ",
        },
        Division {
            code: "DRC",
            name: "Division de la Réglementation et des Conventions",
            direction_code: "DAJ",
        },
        Division {
            code: "DPS",
            name: "Division de la Planification Stratégique",
            direction_code: "DEP",
        },
        Division {
            code: "DST",
            name: "Division des Statistiques",
            direction_code: "DEP",
        },
        Division {
            code: "DTX",
            name: "Division des Travaux",
            direction_code: "DIE",
        },
        Division {
            code: "DMA",
            name: "Division de la Maintenance",
            direction_code: "DIE",
        },
        Division {
            code: "DPT",
            name: "Division du Patrimoine",
            direction_code: "DIE",
        },
        Division {
            code: "DGC",
            name: "Division de la Gestion des Carrières",
            direction_code: "DRH",
        },
        Division {
            code: "DFC",
            name: "Division de la Formation Continue",
            direction_code: "DRH",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_division_to_parent_direction() {
        let directory = OrganizationDirectory::standard();
        assert_eq!(directory.resolve_direction("DSI"), Ok("DAF"));
        assert_eq!(directory.resolve_direction("DTX"), Ok("DIE"));
    }

    #[test]
    fn unknown_division_is_reported() {
        let directory = OrganizationDirectory::standard();
        assert_eq!(
            directory.resolve_direction("UNKNOWN"),
            Err(DirectoryError::UnknownDivision("UNKNOWN".to_string()))
        );
    }

    #[test]
    fn divisions_of_lists_children_and_tolerates_unknown_directions() {
        let directory = OrganizationDirectory::standard();
        assert_eq!(directory.divisions_of("DAF"), vec!["DBC", "DMG", "DSI"]);
        assert!(directory.divisions_of("XYZ").is_empty());
    }

    #[test]
    fn every_division_points_at_a_known_direction() {
        let directory = OrganizationDirectory::standard();
        for division in directory.divisions() {
            assert!(directory.direction(division.direction_code).is_some());
        }
        let codes: Vec<_> = directory.directions().map(|d| d.code).collect();
        let mut sorted = codes.clone();
        sorted.sort_unstable();
        assert_eq!(codes, sorted);
    }

    #[test]
    fn standard_tables_pass_validation() {
        let built = OrganizationDirectory::new(standard_directions(), standard_divisions())
            .expect("standard tables are consistent");
        assert_eq!(
            built.divisions().count(),
            OrganizationDirectory::standard().divisions().count()
        );
    }

    #[test]
    fn dangling_parent_is_rejected_at_construction() {
        let err = OrganizationDirectory::new(
            standard_directions(),
            vec![Division {
                code: "X",
                name: "Orphan",
                direction_code: "NOPE",
            }],
        )
        .expect_err("NOPE is not a direction");
        assert_eq!(
            err,
            DirectoryError::DanglingParent {
                division: "X".to_string(),
                direction: "NOPE".to_string(),
            }
        );
    }
}
