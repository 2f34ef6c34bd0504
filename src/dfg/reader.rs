//! Tile-config JSON frontend: builds a [`Dfg`] from an array of tile
//! records and writes the DVFS-annotated array back out.
//!
//! Edges are driven by each record's source-side fields (`src_a`,
//! `src_b`, `src_data`, `src_bool`, `bps_src`, `bps_alt_src`), so a
//! bypass port is never confused with its tile's compute node.
//! Destination-side fields are consulted for off-grid store synthesis and
//! for the bypass nodes' own outgoing wiring. Out-of-grid endpoints
//! synthesize `<tile>_ld_sram` / `<tile>_st_sram` nodes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dfg::{Dfg, Node};
use crate::diagnostic::{Diagnostic, Span};
use crate::params::{DvfsMode, OpClass};

/// Side length of the tile grid (64 tiles).
pub const GRID: i64 = 8;

/// One tile record of the configuration array.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TileRecord {
    pub x: i64,
    pub y: i64,
    pub op: String,
    pub dvfs: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_a: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_b: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_bool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_true: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_false: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bps_src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bps_dst: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bps_alt_src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bps_alt_dst: Option<Vec<String>>,
}

/// A routing direction on the grid. `Local` ("self") names an intra-tile
/// path and produces no graph edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dir {
    N,
    E,
    S,
    W,
    Local,
}

fn parse_dir(s: &str, record: &TileRecord) -> Result<Dir, Diagnostic> {
    match s {
        "N" => Ok(Dir::N),
        "E" => Ok(Dir::E),
        "S" => Ok(Dir::S),
        "W" => Ok(Dir::W),
        "self" => Ok(Dir::Local),
        _ => Err(Diagnostic::error(
            format!("malformed direction '{}'", s),
            Span::dummy(),
        )
        .with_note(record_note(record))
        .with_help("expected one of N, E, S, W, self".to_string())),
    }
}

fn neighbor(x: i64, y: i64, dir: Dir) -> (i64, i64) {
    match dir {
        Dir::N => (x, y + 1),
        Dir::E => (x + 1, y),
        Dir::S => (x, y - 1),
        Dir::W => (x - 1, y),
        Dir::Local => (x, y),
    }
}

fn in_grid(x: i64, y: i64) -> bool {
    (0..GRID).contains(&x) && (0..GRID).contains(&y)
}

pub fn tile_name(x: i64, y: i64) -> String {
    format!("t{}_{}", x, y)
}

fn record_note(r: &TileRecord) -> String {
    format!("tile ({}, {})", r.x, r.y)
}

fn mode_of(r: &TileRecord) -> Result<DvfsMode, Diagnostic> {
    DvfsMode::from_selector(&r.dvfs).ok_or_else(|| {
        Diagnostic::error(format!("unknown dvfs mode '{}'", r.dvfs), Span::dummy())
            .with_note(record_note(r))
            .with_help("expected one of slow, nominal, fast".to_string())
    })
}

fn op_of(r: &TileRecord) -> Result<OpClass, Diagnostic> {
    OpClass::from_op(&r.op).ok_or_else(|| {
        Diagnostic::error(format!("unknown op '{}'", r.op), Span::dummy())
            .with_note(record_note(r))
    })
}

/// Read and build a DFG from a tile-config file.
pub fn read_dfg(path: &Path) -> Result<Dfg, Diagnostic> {
    let source = fs::read_to_string(path).map_err(|e| {
        Diagnostic::error(
            format!("cannot read '{}': {}", path.display(), e),
            Span::dummy(),
        )
    })?;
    parse_dfg(&source)
}

/// Build a DFG from tile-config JSON text.
pub fn parse_dfg(source: &str) -> Result<Dfg, Diagnostic> {
    let records: Vec<TileRecord> = serde_json::from_str(source).map_err(|e| {
        let offset = byte_offset(source, e.line(), e.column());
        Diagnostic::error(
            format!("malformed tile config: {}", e),
            Span::new(offset, offset.saturating_add(1)),
        )
    })?;
    build_dfg(&records)
}

/// Build a DFG from parsed tile records.
pub fn build_dfg(records: &[TileRecord]) -> Result<Dfg, Diagnostic> {
    let mut dfg = Dfg::new();

    for r in records {
        let op = op_of(r)?;
        let mode = mode_of(r)?;
        let name = tile_name(r.x, r.y);

        if op == OpClass::Br
            && (r.src_data.is_none()
                || r.src_bool.is_none()
                || r.dst_true.is_none()
                || r.dst_false.is_none())
        {
            return Err(Diagnostic::error(
                "branch record missing required fields".to_string(),
                Span::dummy(),
            )
            .with_note(record_note(r))
            .with_help("branches need src_data, src_bool, dst_true, dst_false".to_string()));
        }

        dfg.add_node(Node::new(name.clone(), op, mode))
            .map_err(|d| d.with_note(record_note(r)))?;
        if r.bps_src.is_some() || r.bps_dst.is_some() {
            dfg.add_node(Node::new(format!("{}_byp", name), OpClass::Byp, mode))
                .map_err(|d| d.with_note(record_note(r)))?;
        }
        if r.bps_alt_src.is_some() || r.bps_alt_dst.is_some() {
            dfg.add_node(Node::new(format!("{}_bypalt", name), OpClass::Byp, mode))
                .map_err(|d| d.with_note(record_note(r)))?;
        }
    }

    for r in records {
        let op = op_of(r)?;
        let mode = mode_of(r)?;
        let name = tile_name(r.x, r.y);

        let src_fields: Vec<&String> = if op == OpClass::Br {
            [&r.src_data, &r.src_bool].into_iter().flatten().collect()
        } else {
            [&r.src_a, &r.src_b].into_iter().flatten().collect()
        };
        for field in src_fields {
            wire_input(&mut dfg, r, field, &name, mode)?;
        }
        if let Some(field) = &r.bps_src {
            wire_input(&mut dfg, r, field, &format!("{}_byp", name), mode)?;
        }
        if let Some(field) = &r.bps_alt_src {
            wire_input(&mut dfg, r, field, &format!("{}_bypalt", name), mode)?;
        }

        let dst_fields: Vec<&String> = [&r.dst_true, &r.dst_false]
            .into_iter()
            .flatten()
            .chain(r.dst.iter().flatten())
            .collect();
        for field in dst_fields {
            wire_output(&mut dfg, r, field, &name, mode, false)?;
        }
        for field in r.bps_dst.iter().flatten() {
            wire_output(&mut dfg, r, field, &format!("{}_byp", name), mode, true)?;
        }
        for field in r.bps_alt_dst.iter().flatten() {
            wire_output(&mut dfg, r, field, &format!("{}_bypalt", name), mode, true)?;
        }
    }

    Ok(dfg)
}

/// Connect the edge described by a source-side direction field into `to`.
fn wire_input(
    dfg: &mut Dfg,
    r: &TileRecord,
    field: &str,
    to: &str,
    mode: DvfsMode,
) -> Result<(), Diagnostic> {
    let dir = parse_dir(field, r)?;
    if dir == Dir::Local {
        return Ok(());
    }
    let (nx, ny) = neighbor(r.x, r.y, dir);
    if in_grid(nx, ny) {
        let src = tile_name(nx, ny);
        if !dfg.contains(&src) {
            return Err(Diagnostic::error(
                format!("source direction '{}' references empty tile ({}, {})", field, nx, ny),
                Span::dummy(),
            )
            .with_note(record_note(r)));
        }
        dfg.connect(&src, to, false)
    } else {
        let ld = format!("{}_ld_sram", tile_name(r.x, r.y));
        if !dfg.contains(&ld) {
            dfg.add_node(Node::new(ld.clone(), OpClass::Sram, mode))?;
        }
        dfg.connect(&ld, to, false)
    }
}

/// Handle a destination-side direction field leaving `from`. In-grid
/// compute destinations are covered by the target record's own source
/// fields; bypass nodes wire their in-grid destinations here.
fn wire_output(
    dfg: &mut Dfg,
    r: &TileRecord,
    field: &str,
    from: &str,
    mode: DvfsMode,
    bypass: bool,
) -> Result<(), Diagnostic> {
    let dir = parse_dir(field, r)?;
    if dir == Dir::Local {
        return Ok(());
    }
    let (nx, ny) = neighbor(r.x, r.y, dir);
    if in_grid(nx, ny) {
        if bypass && dfg.contains(&tile_name(nx, ny)) {
            return dfg.connect(from, &tile_name(nx, ny), false);
        }
        Ok(())
    } else {
        let st = format!("{}_st_sram", tile_name(r.x, r.y));
        if !dfg.contains(&st) {
            dfg.add_node(Node::new(st.clone(), OpClass::Sram, mode))?;
        }
        dfg.connect(from, &st, false)
    }
}

/// Rewrite the tile config with each record's `dvfs` field derived from
/// its node's final voltage. A missing source file downgrades to a
/// warning and the dump is skipped.
pub fn dump_dvfs(dfg: &Dfg, input: &Path, suffix: &str) -> Result<Option<PathBuf>, Diagnostic> {
    if !input.exists() {
        Diagnostic::warning(
            format!("tile config '{}' not found, skipping DVFS dump", input.display()),
            Span::dummy(),
        )
        .emit();
        return Ok(None);
    }
    let source = fs::read_to_string(input).map_err(|e| {
        Diagnostic::error(
            format!("cannot read '{}': {}", input.display(), e),
            Span::dummy(),
        )
    })?;
    let mut value: serde_json::Value = serde_json::from_str(&source).map_err(|e| {
        Diagnostic::error(format!("malformed tile config: {}", e), Span::dummy())
    })?;

    if let Some(records) = value.as_array_mut() {
        for record in records.iter_mut() {
            let Some(obj) = record.as_object_mut() else {
                continue;
            };
            let (Some(x), Some(y)) = (
                obj.get("x").and_then(|v| v.as_i64()),
                obj.get("y").and_then(|v| v.as_i64()),
            ) else {
                continue;
            };
            if let Some(node) = dfg.get_node(&tile_name(x, y)) {
                obj.insert(
                    "dvfs".to_string(),
                    serde_json::Value::String(
                        DvfsMode::label_for_voltage(node.voltage).to_string(),
                    ),
                );
            }
        }
    }

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dfg");
    let out = input.with_file_name(format!("{}{}.json", stem, suffix));
    write_sorted_json(&out, &value)?;
    Ok(Some(out))
}

/// Write a JSON value with sorted keys and 4-space indentation.
pub fn write_sorted_json(path: &Path, value: &serde_json::Value) -> Result<(), Diagnostic> {
    let mut buf = Vec::new();
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
    value.serialize(&mut ser).map_err(|e| {
        Diagnostic::error(format!("cannot serialize '{}': {}", path.display(), e), Span::dummy())
    })?;
    buf.push(b'\n');
    fs::write(path, buf).map_err(|e| {
        Diagnostic::error(format!("cannot write '{}': {}", path.display(), e), Span::dummy())
    })
}

/// Read a JSON file produced by this toolkit.
pub fn read_json_file(path: &Path) -> Result<serde_json::Value, Diagnostic> {
    let source = fs::read_to_string(path).map_err(|e| {
        Diagnostic::error(
            format!("cannot read '{}': {}", path.display(), e),
            Span::dummy(),
        )
    })?;
    serde_json::from_str(&source).map_err(|e| {
        Diagnostic::error(format!("malformed JSON in '{}': {}", path.display(), e), Span::dummy())
    })
}

fn byte_offset(source: &str, line: usize, column: usize) -> u32 {
    let mut offset = 0usize;
    for (i, l) in source.lines().enumerate() {
        if i + 1 == line {
            return (offset + column.saturating_sub(1)) as u32;
        }
        offset += l.len() + 1;
    }
    offset as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(x: i64, y: i64, op: &str) -> TileRecord {
        TileRecord {
            x,
            y,
            op: op.to_string(),
            dvfs: "nominal".to_string(),
            src_a: None,
            src_b: None,
            dst: None,
            src_data: None,
            src_bool: None,
            dst_true: None,
            dst_false: None,
            bps_src: None,
            bps_dst: None,
            bps_alt_src: None,
            bps_alt_dst: None,
        }
    }

    #[test]
    fn test_two_tile_pipeline() {
        let mut a = record(0, 0, "mul");
        a.src_a = Some("W".to_string());
        a.dst = Some(vec!["E".to_string()]);
        let mut b = record(1, 0, "add");
        b.src_a = Some("W".to_string());
        let dfg = build_dfg(&[a, b]).unwrap();

        assert!(dfg.contains("t0_0"));
        assert!(dfg.contains("t1_0"));
        assert!(dfg.contains("t0_0_ld_sram"));
        assert_eq!(dfg.get_srcs("t1_0"), ["t0_0"]);
        assert_eq!(dfg.get_srcs("t0_0"), ["t0_0_ld_sram"]);
    }

    #[test]
    fn test_off_grid_store_synthesis() {
        let mut a = record(7, 7, "mul");
        a.src_a = Some("N".to_string());
        a.dst = Some(vec!["E".to_string()]);
        let dfg = build_dfg(&[a]).unwrap();

        assert!(dfg.contains("t7_7_ld_sram"));
        assert!(dfg.contains("t7_7_st_sram"));
        assert_eq!(dfg.get_dsts("t7_7"), ["t7_7_st_sram"]);
    }

    #[test]
    fn test_self_direction_ignored() {
        let mut a = record(0, 0, "mul");
        a.src_a = Some("self".to_string());
        let dfg = build_dfg(&[a]).unwrap();
        assert!(dfg.get_srcs("t0_0").is_empty());
        assert_eq!(dfg.len(), 1);
    }

    #[test]
    fn test_bypass_lowering() {
        let mut a = record(0, 0, "mul");
        a.src_a = Some("W".to_string());
        a.bps_src = Some("S".to_string());
        a.bps_dst = Some(vec!["E".to_string()]);
        let mut b = record(1, 0, "add");
        b.src_a = Some("W".to_string());
        let dfg = build_dfg(&[a, b]).unwrap();

        assert!(dfg.contains("t0_0_byp"));
        // bypass sources from off-grid south, shares the tile's load sram
        assert_eq!(dfg.get_srcs("t0_0_byp"), ["t0_0_ld_sram"]);
        // bypass output reaches the east neighbor's compute node
        assert!(dfg.get_dsts("t0_0_byp").contains(&"t1_0".to_string()));
    }

    #[test]
    fn test_unknown_op_rejected() {
        let a = record(0, 0, "frob");
        let err = build_dfg(&[a]).unwrap_err();
        assert!(err.message.contains("unknown op"));
        assert!(err.notes.iter().any(|n| n.contains("(0, 0)")));
    }

    #[test]
    fn test_unknown_dvfs_rejected() {
        let mut a = record(0, 0, "mul");
        a.dvfs = "turbo".to_string();
        let err = build_dfg(&[a]).unwrap_err();
        assert!(err.message.contains("unknown dvfs mode"));
    }

    #[test]
    fn test_branch_requires_fields() {
        let mut a = record(0, 0, "br");
        a.src_data = Some("W".to_string());
        let err = build_dfg(&[a]).unwrap_err();
        assert!(err.message.contains("branch record"));
    }

    #[test]
    fn test_branch_wiring() {
        let mut d = record(0, 0, "mul");
        d.src_a = Some("W".to_string());
        d.dst = Some(vec!["E".to_string()]);
        let mut c = record(0, 1, "eq");
        c.src_a = Some("S".to_string());
        let mut br = record(1, 0, "br");
        br.src_data = Some("W".to_string());
        br.src_bool = Some("N".to_string());
        br.dst_true = Some("E".to_string());
        br.dst_false = Some("N".to_string());
        let mut x = record(2, 0, "cp");
        x.src_a = Some("W".to_string());
        let mut y = record(1, 1, "cp");
        y.src_a = Some("S".to_string());
        let dfg = build_dfg(&[d, c, br, x, y]).unwrap();

        let mut br_srcs = dfg.get_srcs("t1_0");
        br_srcs.sort();
        assert_eq!(br_srcs, ["t0_0", "t1_1"]);
        assert_eq!(dfg.get_srcs("t2_0"), ["t1_0"]);
        assert_eq!(dfg.get_srcs("t1_1"), ["t1_0"]);
    }

    #[test]
    fn test_duplicate_tile_rejected() {
        let a = record(0, 0, "mul");
        let b = record(0, 0, "add");
        let err = build_dfg(&[a, b]).unwrap_err();
        assert!(err.message.contains("duplicate node name"));
    }

    #[test]
    fn test_empty_tile_reference_rejected() {
        let mut a = record(3, 3, "mul");
        a.src_a = Some("W".to_string());
        let err = build_dfg(&[a]).unwrap_err();
        assert!(err.message.contains("empty tile"));
    }

    #[test]
    fn test_parse_error_reports_location() {
        let err = parse_dfg("[{\"x\": 0,").unwrap_err();
        assert!(err.message.contains("malformed tile config"));
    }

    #[test]
    fn test_dump_dvfs_missing_input_is_warning() {
        let dfg = Dfg::new();
        let out = dump_dvfs(&dfg, Path::new("/nonexistent/dfg.json"), "_dvfs").unwrap();
        assert!(out.is_none());
    }
}
