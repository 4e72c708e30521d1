//! End-to-end tests for malformed input, fatal errors and configuration.
//!
//! Recoverable problems must land in the report without stopping the run;
//! fatal ones must surface as typed errors.

use pci_planner::{
    Error, IssueKind, Planner, PlannerConfig, PlanningInput, Table, Technology, TechnologyInput,
    Value, ViolationKind,
};

// ============================================================================
// Helpers
// ============================================================================

const COLUMNS: [&str; 6] = ["eNodeB ID", "Cell ID", "Site ID", "Latitude", "Longitude", "PCI"];

fn template() -> Table {
    Table::new(COLUMNS)
        .with_row(COLUMNS)
        .with_row(["mandatory"; 6])
        .with_row(["long"; 6])
}

fn row(enb: impl Into<Value>, cell: impl Into<Value>, site: &str, lat: Option<f64>, lon: Option<f64>, pci: Option<u16>) -> [Value; 6] {
    [enb.into(), cell.into(), Value::from(site), Value::from(lat), Value::from(lon), Value::from(pci)]
}

fn plan(planned: Table, existing: Table) -> pci_planner::Result<pci_planner::TechnologyOutput> {
    Planner::new(PlannerConfig::new(1.0))
        .unwrap()
        .plan_technology(Technology::Lte, &TechnologyInput { planned, existing })
}

// ============================================================================
// 1. Malformed rows are skipped and reported
// ============================================================================

#[test]
fn test_malformed_rows_reported() {
    let planned = template()
        .with_row(row("n/a", 1, "S1", None, None, None))
        .with_row(row(" 1,001 ", "", "S1", None, None, None))
        .with_row(row(1002, 1, "S2", None, None, None));

    let out = plan(planned, template()).unwrap();

    let malformed: Vec<_> = out.report.issues.iter().filter(|i| i.kind == IssueKind::MalformedRecord).collect();
    assert_eq!(malformed.len(), 2);
    assert_eq!(malformed[0].ordinal, Some(3));
    assert_eq!(malformed[1].ordinal, Some(4));
    assert_eq!(malformed[0].table.as_deref(), Some("planned"));
    assert_eq!(out.report.inserted_count, 1);
}

#[test]
fn test_unusable_pci_reported_and_replanned() {
    let mut planned = template().with_row(row(1, 1, "S1", None, None, None));
    planned.rows[3].set(5, Value::from(-3));

    let out = plan(planned, template()).unwrap();

    assert_eq!(out.report.issues.len(), 1);
    assert_eq!(out.report.issues[0].kind, IssueKind::MalformedRecord);
    assert_eq!(out.report.issues[0].ordinal, Some(3));
    assert!(out.report.issues[0].message.contains("-3"));
    assert_eq!(out.report.inserted_count, 1);
    assert_eq!(out.table.rows[3].get(5), &Value::from(0u16));
}

// ============================================================================
// 2. Cells with no site and no position are excluded but the run continues
// ============================================================================

#[test]
fn test_unplaceable_cell_is_excluded() {
    let planned = template()
        .with_row(row(1, 1, "", None, None, None))
        .with_row(row(1, 2, "", Some(23.1), None, None))
        .with_row(row(2, 1, "S2", None, None, None));

    let out = plan(planned, template()).unwrap();

    let excluded: Vec<_> = out.report.issues.iter().filter(|i| i.kind == IssueKind::InvalidPosition).collect();
    assert_eq!(excluded.len(), 2);
    assert_eq!(out.report.unmatched_count, 2);
    assert_eq!(out.report.inserted_count, 1);
}

#[test]
fn test_out_of_range_coordinates_are_no_position() {
    let planned = template().with_row(row(1, 1, "", Some(123.0), Some(113.0), None));
    let out = plan(planned, template()).unwrap();
    assert_eq!(out.report.issues.len(), 1);
    assert_eq!(out.report.issues[0].kind, IssueKind::InvalidPosition);
}

// ============================================================================
// 3. Fatal errors
// ============================================================================

#[test]
fn test_duplicate_identity_is_fatal() {
    let existing = template()
        .with_row(row(1, 1, "S1", None, None, Some(1)))
        .with_row(row(1, 1, "S2", None, None, Some(2)));
    let err = plan(template(), existing).unwrap_err();
    match err {
        Error::IdentityCollision { table, first, second, .. } => {
            assert_eq!(table, "existing");
            assert_eq!((first, second), (3, 4));
        }
        other => panic!("expected IdentityCollision, got {other}"),
    }
}

#[test]
fn test_missing_identity_column_is_fatal() {
    let planned = Table::new(["eNodeB ID", "PCI"]);
    let err = plan(planned, template()).unwrap_err();
    assert!(matches!(err, Error::MissingColumn { ref table, .. } if table == "planned"));
}

#[test]
fn test_fatal_error_in_one_technology_fails_the_call() {
    let bad = Table::new(["eNodeB ID", "PCI"]);
    let input = PlanningInput::default().with_lte(TechnologyInput { planned: bad, existing: template() });
    let planner = Planner::new(PlannerConfig::new(1.0)).unwrap();
    assert!(planner.plan(&input).is_err());
}

// ============================================================================
// 4. Empty inputs
// ============================================================================

#[test]
fn test_empty_tables() {
    let out = plan(template(), template()).unwrap();
    assert_eq!(out.table, template());
    assert!(out.assignment.is_empty());
    assert!(out.report.is_clean());

    let out = plan(Table::new(COLUMNS), Table::new(COLUMNS)).unwrap();
    assert_eq!(out.report.skipped_protected_count, 0);
    assert!(out.table.is_empty());

    let planner = Planner::new(PlannerConfig::new(1.0)).unwrap();
    let output = planner.plan(&PlanningInput::default()).unwrap();
    assert!(output.lte.is_none() && output.nr.is_none());
}

// ============================================================================
// 5. Existing conflicts between pinned cells are reported, not repaired
// ============================================================================

#[test]
fn test_pinned_collision_reported_as_residual() {
    let existing = template()
        .with_row(row(1, 1, "S1", Some(23.1), Some(113.2), Some(4)))
        .with_row(row(1, 2, "S1", Some(23.1), Some(113.2), Some(7)));

    let out = plan(template(), existing.clone()).unwrap();
    assert_eq!(out.table, existing);
    assert_eq!(out.report.residual_violations.len(), 1);
    assert_eq!(out.report.residual_violations[0].kind, ViolationKind::SameSite);

    let planner = Planner::new(PlannerConfig::new(1.0)).unwrap();
    assert_eq!(planner.validate(Technology::Lte, &existing).unwrap().len(), 1);
}

// ============================================================================
// 6. Configuration
// ============================================================================

#[test]
fn test_config_from_json() {
    let json = r#"{
        "proximity": { "threshold_km": 0.8, "metric": "planar" },
        "reuse_distance_km": 5.0,
        "protected_rows": 2,
        "bit_length_bands": [
            { "from_mhz": 2000.0, "to_mhz": 3000.0, "bit_length": 22 },
            { "from_mhz": 3000.0, "to_mhz": 5000.0, "bit_length": 24 }
        ],
        "nr": { "modulus": 30, "pci_max": 1007, "secondary_modulus": 3, "planned_fields": ["Tilt"] }
    }"#;
    let config = PlannerConfig::from_json_str(json).unwrap();
    assert_eq!(config.protected_rows, 2);
    assert_eq!(config.reuse_distance_km, Some(5.0));
    assert_eq!(config.nr.planned_fields, vec!["Tilt".to_string()]);
    assert!(Planner::new(config).is_ok());
}

#[test]
fn test_invalid_config_rejected() {
    let overlapping = r#"{
        "proximity": { "threshold_km": 1.0 },
        "bit_length_bands": [
            { "from_mhz": 2000.0, "to_mhz": 3100.0, "bit_length": 22 },
            { "from_mhz": 3000.0, "to_mhz": 5000.0, "bit_length": 24 }
        ]
    }"#;
    assert!(matches!(PlannerConfig::from_json_str(overlapping), Err(Error::Config(_))));
    assert!(matches!(PlannerConfig::from_json_str("not json"), Err(Error::Json(_))));
    assert!(matches!(Planner::new(PlannerConfig::new(-1.0)), Err(Error::Config(_))));
    assert!(matches!(PlannerConfig::from_path("/nonexistent/planner.json"), Err(Error::Io(_))));
}
