// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

/// Flags a JavaScript regex literal may carry after its closing slash.
const LITERAL_FLAGS: &str = "dgimsuvy";

/// Turn a `/pattern/flags` regex literal, as browsers serialize them, into a
/// bare pattern. The `i`, `m` and `s` flags become inline groups; other
/// flags do not affect whole-name matching and are dropped. Anything that is
/// not such a literal is returned unchanged.
pub fn strip_delimiters(raw: &str) -> String {
    let Some(rest) = raw.strip_prefix('/') else {
        return raw.to_string();
    };
    let Some(close) = rest.rfind('/') else {
        return raw.to_string();
    };
    let (pattern, flags) = (&rest[..close], &rest[close + 1..]);
    if !flags.chars().all(|c| LITERAL_FLAGS.contains(c)) {
        return raw.to_string();
    }

    let inline: String = flags.chars().filter(|c| matches!(c, 'i' | 'm' | 's')).collect();
    if inline.is_empty() || pattern.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{inline}){pattern}")
    }
}
