//! End-to-end tests for merging planned cells into the network inventory.
//!
//! Covers key-exact matching, planned-field propagation, row insertion,
//! derived gNodeB bit length and the JSON run report.

use pci_planner::{
    ColumnDefault, FrequencyBand, IdentityKey, Planner, PlannerConfig, Row, Table, Technology, TechnologyInput,
    Value,
};
use pretty_assertions::assert_eq;

// ============================================================================
// Helpers: NR template with PLMN split across MCC/MNC/PLMN columns
// ============================================================================

const COLUMNS: [&str; 10] = [
    "gNodeB ID\ngNBId",
    "Cell ID\ncellLocalId",
    "MCC",
    "MNC",
    "PLMN",
    "Site ID",
    "SSB Frequency",
    "PCI",
    "Tilt\nelectrical tilt",
    "gNodeBLength",
];

const GNB: usize = 0;
const CELL: usize = 1;
const PCI: usize = 7;
const TILT: usize = 8;
const BITS: usize = 9;

fn template() -> Table {
    Table::new(COLUMNS)
        .with_row(COLUMNS)
        .with_row(["mandatory"; 10])
        .with_row(["long"; 10])
}

struct Cell {
    gnb: u32,
    cell: u32,
    mcc: Value,
    mnc: Value,
    plmn: Value,
    site: &'static str,
    pci: Option<u16>,
    tilt: Option<i64>,
}

fn cell(gnb: u32, cell: u32, site: &'static str) -> Cell {
    Cell {
        gnb,
        cell,
        mcc: Value::from("310"),
        mnc: Value::from("410"),
        plmn: Value::Null,
        site,
        pci: None,
        tilt: None,
    }
}

impl Cell {
    fn pci(mut self, pci: u16) -> Self {
        self.pci = Some(pci);
        self
    }

    fn tilt(mut self, tilt: i64) -> Self {
        self.tilt = Some(tilt);
        self
    }

    fn plmn_only(mut self, plmn: &str) -> Self {
        self.mcc = Value::Null;
        self.mnc = Value::Null;
        self.plmn = Value::from(plmn);
        self
    }

    fn row(self) -> Row {
        Row::new([
            Value::from(self.gnb),
            Value::from(self.cell),
            self.mcc,
            self.mnc,
            self.plmn,
            Value::from(self.site),
            Value::from(3500.0),
            Value::from(self.pci),
            Value::from(self.tilt),
            Value::Null,
        ])
    }
}

fn table(cells: Vec<Cell>) -> Table {
    let mut t = template();
    t.rows.extend(cells.into_iter().map(Cell::row));
    t
}

fn config() -> PlannerConfig {
    let mut config = PlannerConfig::new(1.0);
    config.nr.planned_fields = vec!["Tilt".into()];
    config
}

fn run(config: PlannerConfig, planned: Table, existing: Table) -> pci_planner::TechnologyOutput {
    Planner::new(config)
        .unwrap()
        .plan_technology(Technology::Nr, &TechnologyInput { planned, existing })
        .unwrap()
}

fn find<'t>(table: &'t Table, gnb: u32, cell: u32) -> Vec<&'t Row> {
    table.rows[3..]
        .iter()
        .filter(|r| r.get(GNB).as_int() == Some(gnb as i64) && r.get(CELL).as_int() == Some(cell as i64))
        .collect()
}

// ============================================================================
// 1. Matching is key-exact
// ============================================================================

#[test]
fn test_neighbouring_cell_id_does_not_match() {
    let existing = table(vec![cell(1000, 5, "S1").pci(7).tilt(2)]);
    let planned = table(vec![cell(1000, 6, "S1").tilt(6)]);

    let out = run(config(), planned, existing.clone());

    assert_eq!(out.report.inserted_count, 1);
    assert_eq!(out.report.updated_count, 0);
    assert_eq!(out.table.rows[3], existing.rows[3]);
    let inserted = find(&out.table, 1000, 6);
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0].get(TILT), &Value::Int(6));
    assert_eq!(inserted[0].get(2), &Value::from("310"));
    assert_eq!(inserted[0].get(3), &Value::from("410"));
    assert_ne!(inserted[0].get(PCI).as_int().map(|p| p % 30), Some(7));
}

#[test]
fn test_plmn_and_split_columns_match_each_other() {
    // Existing row carries MCC/MNC, planned row only "310-410".
    let existing = table(vec![cell(1000, 5, "S1").pci(7).tilt(2)]);
    let planned = table(vec![cell(1000, 5, "S1").plmn_only("310-410").tilt(4)]);

    let out = run(config(), planned, existing);

    assert_eq!(out.report.updated_count, 1);
    assert_eq!(out.report.inserted_count, 0);
    assert_eq!(out.report.kept_count, 1);
    let row = find(&out.table, 1000, 5);
    assert_eq!(row.len(), 1);
    assert_eq!(row[0].get(PCI), &Value::from(7u16));
    assert_eq!(row[0].get(TILT), &Value::Int(4));
}

#[test]
fn test_single_digit_mnc_is_padded_before_matching() {
    let mut existing = table(vec![cell(7, 1, "S1").pci(3)]);
    existing.rows[3].set(3, Value::from("01"));
    existing.rows[3].set(2, Value::from(460));
    let planned = table(vec![cell(7, 1, "S1").plmn_only("460-1").pci(3)]);

    let out = run(config(), planned, existing);
    let key = IdentityKey::Nr { mcc: "460".into(), mnc: "01".into(), gnodeb_id: 7, cell_id: 1 };
    assert_eq!(out.assignment.pci(&key), Some(3));
    assert_eq!(out.report.unchanged_count, 1);
    assert_eq!(out.report.inserted_count, 0);
}

// ============================================================================
// 2. Planned fields: only non-blank planned values overwrite
// ============================================================================

#[test]
fn test_blank_planned_field_keeps_existing_value() {
    let existing = table(vec![cell(1000, 5, "S1").pci(7).tilt(2)]);
    let planned = table(vec![cell(1000, 5, "S1")]);

    let out = run(config(), planned, existing.clone());
    assert_eq!(out.report.unchanged_count, 1);
    assert_eq!(out.table, existing);
}

// ============================================================================
// 3. Unmatched: no existing row and no PCI
// ============================================================================

#[test]
fn test_unresolvable_new_cell_is_unmatched() {
    let mut config = config();
    // A two-class space on one site: the third cell cannot be placed.
    config.nr.modulus = 2;
    config.nr.secondary_modulus = None;
    let existing = table(vec![cell(1, 1, "S1").pci(0), cell(1, 2, "S1").pci(1)]);
    let planned = table(vec![cell(1, 3, "S1")]);

    let out = run(config, planned, existing.clone());
    assert_eq!(out.report.unmatched_count, 1);
    assert_eq!(out.report.unresolved_conflicts.len(), 1);
    assert_eq!(out.report.unresolved_conflicts[0].neighbours.len(), 2);
    assert_eq!(out.table, existing);
}

// ============================================================================
// 4. gNodeB bit length written only where empty
// ============================================================================

#[test]
fn test_bit_length_fills_empty_column_only() {
    let mut config = config();
    config.bit_length_bands = vec![FrequencyBand { from_mhz: 3300.0, to_mhz: 3800.0, bit_length: 26 }];

    let mut existing = table(vec![cell(1, 1, "S1").pci(1), cell(2, 1, "S2").pci(2)]);
    existing.rows[4].set(BITS, Value::from(22));
    let planned = table(vec![cell(1, 1, "S1"), cell(2, 1, "S2")]);

    let out = run(config, planned, existing);
    assert_eq!(find(&out.table, 1, 1)[0].get(BITS), &Value::from(26u8));
    assert_eq!(find(&out.table, 2, 1)[0].get(BITS), &Value::from(22));
    assert_eq!(out.report.updated_count, 1);
    assert_eq!(out.report.unchanged_count, 1);
}

// ============================================================================
// 5. Template defaults only reach inserted rows
// ============================================================================

#[test]
fn test_defaults_apply_to_inserted_rows() {
    let mut config = config();
    // PLMN is part of the identity and never takes a default.
    config.nr.defaults = vec![ColumnDefault::new("Tilt", 1), ColumnDefault::new("PLMN", "999-99")];

    let existing = table(vec![cell(1000, 5, "S1").pci(7)]);
    let planned = table(vec![cell(1000, 5, "S1"), cell(1000, 6, "S1"), cell(1000, 7, "S1").tilt(6)]);
    let out = run(config, planned, existing.clone());

    assert_eq!(out.report.inserted_count, 2);
    assert_eq!(out.report.unchanged_count, 1);
    assert_eq!(&out.table.rows[..4], &existing.rows[..4]);
    let six = find(&out.table, 1000, 6);
    assert_eq!(six[0].get(TILT), &Value::from(1));
    assert!(six[0].get(4).is_blank());
    assert_eq!(find(&out.table, 1000, 7)[0].get(TILT), &Value::Int(6));
}

// ============================================================================
// 6. Report serialises with the documented field names
// ============================================================================

#[test]
fn test_report_json() {
    let existing = table(vec![cell(1000, 5, "S1").pci(7)]);
    let planned = table(vec![cell(1000, 6, "S1")]);
    let out = run(config(), planned, existing);

    let json: serde_json::Value = serde_json::from_str(&out.report.to_json().unwrap()).unwrap();
    assert_eq!(json["technology"], "NR");
    assert_eq!(json["inserted_count"], 1);
    assert_eq!(json["skipped_protected_count"], 3);
    assert_eq!(json["residual_violations"], serde_json::json!([]));
}
