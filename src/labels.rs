/// The six PCB defect classes the detector is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefectKind {
    MissingHole,
    MouseBite,
    OpenCircuit,
    ShortCircuit,
    Spur,
    SpuriousCopper,
}

impl DefectKind {
    /// Display order of the counters.
    pub const ALL: [DefectKind; 6] = [
        DefectKind::MissingHole,
        DefectKind::MouseBite,
        DefectKind::OpenCircuit,
        DefectKind::ShortCircuit,
        DefectKind::Spur,
        DefectKind::SpuriousCopper,
    ];

    /// Class name as emitted by the model.
    pub fn raw_name(self) -> &'static str {
        match self {
            DefectKind::MissingHole => "missing_hole",
            DefectKind::MouseBite => "mouse_bite",
            DefectKind::OpenCircuit => "open_circuit",
            DefectKind::ShortCircuit => "short",
            DefectKind::Spur => "spur",
            DefectKind::SpuriousCopper => "spurious_copper",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            DefectKind::MissingHole => "Missing Hole",
            DefectKind::MouseBite => "Mouse Bite",
            DefectKind::OpenCircuit => "Open Circuit",
            DefectKind::ShortCircuit => "Short Circuit",
            DefectKind::Spur => "Spur",
            DefectKind::SpuriousCopper => "Spurious Copper",
        }
    }

    pub fn from_raw(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.raw_name() == raw)
    }

    pub fn from_display(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.display_name() == label)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Display label for a raw model class name. Unknown names pass through unchanged.
pub fn display_label(raw: &str) -> String {
    match DefectKind::from_raw(raw) {
        Some(kind) => kind.display_name().to_string(),
        None => raw.to_string(),
    }
}

/// Raw class names in training order, used when the model carries no metadata.
pub fn default_class_names() -> Vec<String> {
    DefectKind::ALL
        .iter()
        .map(|kind| kind.raw_name().to_string())
        .collect()
}
