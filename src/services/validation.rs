use std::collections::HashMap;

use tracing::trace;

use crate::models::detection::{DetectionError, DetectionLine};

/// Keep only the detection lines that are well formed and refer to one of
/// `num_classes` local classes.
///
/// Lines are trimmed (so `\r\n` input is accepted) and re-emitted with single
/// spaces and a trailing newline. With no class list loaded (`num_classes == 0`)
/// nothing can be validated and the result is empty.
pub fn validate(raw: &str, num_classes: usize) -> String {
    if num_classes == 0 {
        return String::new();
    }

    let mut out = String::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match DetectionLine::parse(line).and_then(|d| {
            if d.class_in_range(num_classes) {
                Ok(d)
            } else {
                Err(DetectionError::UnknownClass(d.class_id))
            }
        }) {
            Ok(detection) => push_line(&mut out, detection.class_id, line),
            Err(e) => trace!(line, reason = %e, "Dropping detection"),
        }
    }
    out
}

/// Translate server class ids into local class ids by name.
///
/// `server_class_names[i]` names the server's class `i`. Names are matched
/// against `local_classes` after trimming and lower-casing; the first local
/// entry wins on duplicates. Lines whose class has no local counterpart are
/// dropped, as are lines with invalid coordinates.
pub fn remap(raw: &str, server_class_names: &[String], local_classes: &[String]) -> String {
    if local_classes.is_empty() {
        return String::new();
    }

    let mut lookup: HashMap<String, usize> = HashMap::with_capacity(local_classes.len());
    for (idx, name) in local_classes.iter().enumerate() {
        lookup.entry(normalize(name)).or_insert(idx);
    }

    let mut out = String::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let detection = match DetectionLine::parse(line) {
            Ok(d) if d.class_in_range(server_class_names.len()) => d,
            Ok(d) => {
                trace!(line, class_id = d.class_id, "Server class id has no name");
                continue;
            }
            Err(e) => {
                trace!(line, reason = %e, "Dropping detection");
                continue;
            }
        };

        let server_name = &server_class_names[detection.class_id as usize];
        match lookup.get(&normalize(server_name)) {
            Some(&local_id) => push_line(&mut out, local_id as i64, line),
            None => trace!(line, class = %server_name, "No local class for server class"),
        }
    }
    out
}

/// Number of detections in validated label text.
pub fn count_detections(text: &str) -> usize {
    text.lines().filter(|l| !l.trim().is_empty()).count()
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn push_line(out: &mut String, class_id: i64, line: &str) {
    out.push_str(&class_id.to_string());
    for field in line.split_whitespace().skip(1) {
        out.push(' ');
        out.push_str(field);
    }
    out.push('\n');
}
