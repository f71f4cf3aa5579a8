// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Message template rendering.
//!
//! Templates carry named holes that are filled positionally:
//!
//! ```text
//! "Processed {Count} orders for {Tenant}"  +  [42, "acme"]
//!   -> "Processed 42 orders for acme"
//!   -> properties {Count: 42, Tenant: acme, {OriginalFormat}: <template>}
//! ```
//!
//! - `{{` and `}}` render literal braces;
//! - a hole may carry a format suffix (`{Elapsed:N2}`, `{Name,10}`), which is
//!   ignored for rendering and stripped from the property name, as is a
//!   leading `@` or `$`;
//! - a hole without a matching argument is rendered verbatim and adds no
//!   property; surplus arguments are ignored;
//! - an unterminated `{` is rendered verbatim.

use std::fmt::Display;

use crate::constants::ORIGINAL_FORMAT_PROPERTY;
use crate::item::Properties;

/// Renders `template` with `args`, recording each filled hole in `properties`.
pub fn render(
    template: &str,
    args: &[&(dyn Display + Sync)],
    properties: &mut Properties,
) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    let mut next_arg = 0;
    let mut has_holes = false;

    while let Some(position) = rest.find(|c: char| c == '{' || c == '}') {
        rendered.push_str(&rest[..position]);
        let tail = &rest[position..];

        if tail.starts_with("{{") {
            rendered.push('{');
            rest = &tail[2..];
            continue;
        }
        if let Some(after) = tail.strip_prefix('}') {
            rendered.push('}');
            rest = after.strip_prefix('}').unwrap_or(after);
            continue;
        }

        let Some(close) = tail.find('}') else {
            rendered.push_str(tail);
            rest = "";
            break;
        };
        has_holes = true;
        match args.get(next_arg) {
            Some(arg) => {
                let value = arg.to_string();
                let name = hole_name(&tail[1..close]);
                if !name.is_empty() {
                    properties.insert(name.to_string(), value.clone());
                }
                rendered.push_str(&value);
                next_arg += 1;
            }
            None => rendered.push_str(&tail[..=close]),
        }
        rest = &tail[close + 1..];
    }
    rendered.push_str(rest);

    if has_holes {
        properties.insert(ORIGINAL_FORMAT_PROPERTY.to_string(), template.to_string());
    }
    rendered
}

fn hole_name(hole: &str) -> &str {
    hole.split(|c: char| c == ':' || c == ',')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_start_matches(|c: char| c == '@' || c == '$')
}
