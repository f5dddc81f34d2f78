//! Default production line layout loaded at startup.

use autoline_types::{Chamber, ChamberType, Line, LineId, Polarity};

/// Identifier of the seeded line.
pub const DEFAULT_LINE_ID: &str = "line-1";

const ANODE_LAYOUT: [(&str, &str, ChamberType); 6] = [
    ("a-jl", "Anode load lock", ChamberType::LoadLock),
    ("a-hk", "Anode bake", ChamberType::Bake),
    ("a-qs", "Anode cleaning", ChamberType::Cleaning),
    ("a-dj", "Anode docking", ChamberType::Docking),
    ("a-yf", "Anode indium seal", ChamberType::Sealing),
    ("a-cy", "Anode unload", ChamberType::Unload),
];

const CATHODE_LAYOUT: [(&str, &str, ChamberType); 4] = [
    ("c-jl", "Cathode load lock", ChamberType::LoadLock),
    ("c-hk", "Cathode bake", ChamberType::Bake),
    ("c-sz", "Cathode growth", ChamberType::Growth),
    ("c-cy", "Cathode unload", ChamberType::Unload),
];

/// Build the standard line: six anode chambers and four cathode chambers,
/// all idle at ambient conditions with every valve closed.
pub fn default_line() -> Line {
    let line_id = LineId::new(DEFAULT_LINE_ID);
    Line {
        anode_chambers: build_side(&line_id, Polarity::Anode, &ANODE_LAYOUT),
        cathode_chambers: build_side(&line_id, Polarity::Cathode, &CATHODE_LAYOUT),
        id: line_id,
        name: "Line 1".to_owned(),
    }
}

/// Build a minimal line with a single load lock per side.
pub fn blank_line(id: LineId, name: impl Into<String>) -> Line {
    let anode = Chamber::new(
        format!("{id}-a-default"),
        id.clone(),
        "Anode load lock",
        Polarity::Anode,
        ChamberType::LoadLock,
    );
    let cathode = Chamber::new(
        format!("{id}-c-default"),
        id.clone(),
        "Cathode load lock",
        Polarity::Cathode,
        ChamberType::LoadLock,
    );
    Line {
        id,
        name: name.into(),
        anode_chambers: vec![anode],
        cathode_chambers: vec![cathode],
    }
}

fn build_side(
    line_id: &LineId,
    polarity: Polarity,
    layout: &[(&str, &str, ChamberType)],
) -> Vec<Chamber> {
    layout
        .iter()
        .map(|&(id, name, chamber_type)| {
            Chamber::new(id, line_id.clone(), name, polarity, chamber_type)
        })
        .collect()
}
