/// One YOLO detection: `"<class_id> <cx> <cy> <w> <h>"` with normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionLine {
    pub class_id: i64,
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl DetectionLine {
    /// Parse a trimmed line. Checks field count, numeric syntax and the
    /// coordinate ranges (`cx`, `cy` in `[0, 1]`, `w`, `h` in `(0, 1]`).
    /// The class id is only checked for being an integer; its range depends
    /// on which class list it refers to.
    pub fn parse(line: &str) -> Result<Self, DetectionError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(DetectionError::FieldCount(fields.len()));
        }

        let class_id: i64 = fields[0]
            .parse()
            .map_err(|_| DetectionError::NotNumeric(fields[0].to_string()))?;

        let mut coords = [0.0f64; 4];
        for (slot, raw) in coords.iter_mut().zip(&fields[1..]) {
            *slot = raw
                .parse()
                .map_err(|_| DetectionError::NotNumeric(raw.to_string()))?;
        }
        let [cx, cy, w, h] = coords;

        let centre_ok = |v: f64| (0.0..=1.0).contains(&v);
        let extent_ok = |v: f64| v > 0.0 && v <= 1.0;
        if !(centre_ok(cx) && centre_ok(cy) && extent_ok(w) && extent_ok(h)) {
            return Err(DetectionError::OutOfRange);
        }

        Ok(Self {
            class_id,
            cx,
            cy,
            w,
            h,
        })
    }

    pub fn class_in_range(&self, num_classes: usize) -> bool {
        usize::try_from(self.class_id).is_ok_and(|id| id < num_classes)
    }
}

/// Why a detection line was dropped. Never surfaced to the user.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DetectionError {
    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),

    #[error("non-numeric field: {0}")]
    NotNumeric(String),

    #[error("coordinates out of range")]
    OutOfRange,

    #[error("class id {0} out of range")]
    UnknownClass(i64),
}
