//! iPXE operator script renderer (spec §4.C).
//!
//! Generalized from `services::template::TemplateService`: same
//! `minijinja::Environment` + embedded-template approach, but the template
//! is a fixed constant (the script shape is part of the protocol, not
//! operator-supplied) rather than a file loaded per request.

use std::collections::BTreeMap;

use minijinja::{context, Environment};

use crate::domain::HardwareRecord;

const SCRIPT_TEMPLATE: &str = r#"#!ipxe
set packet_mac {{ mac }}
set base-url {{ base_url }}
{% if syslog_host %}set syslog_host {{ syslog_host }}
{% endif -%}
{% if tinkerbell %}set tinkerbell {{ tinkerbell }}
{% endif -%}
set worker_id {{ mac }}
{{ metadata_lines }}
kernel {{ kernel_url }}{% if kernel_args %} {{ kernel_args }}{% endif %}
initrd {{ initrd_url }}
boot
"#;

/// Everything the script needs beyond the matched [`HardwareRecord`]
/// (spec §6 "configuration surface"): values that come from global config
/// rather than the inventory.
#[derive(Debug, Clone, Default)]
pub struct ScriptConfig {
    pub osie_base_url: String,
    pub syslog_host: Option<String>,
    /// Workflow server address, with TLS scheme already applied if enabled.
    pub tinkerbell_url: Option<String>,
    /// Extra kernel arguments, whitespace-split, appended verbatim (spec §4.C.5).
    pub extra_kernel_args: Vec<String>,
}

/// Render the iPXE operator script for a matched record (spec §4.C.4).
///
/// The output is never cached by this function — callers re-render on
/// every request so inventory edits take effect immediately (spec §4.C,
/// testable property 6).
pub fn render(record: &HardwareRecord, config: &ScriptConfig) -> Result<String, minijinja::Error> {
    let mac = record.mac_string();

    let (kernel_url, initrd_url) = match &record.osie {
        Some(osie) => (osie.kernel_url(), osie.initrd_url()),
        None => (
            format!("{}/vmlinuz", config.osie_base_url.trim_end_matches('/')),
            format!("{}/initramfs", config.osie_base_url.trim_end_matches('/')),
        ),
    };

    let mut metadata_lines = String::new();
    let sorted: BTreeMap<&String, &String> = record.metadata.iter().collect();
    for (key, value) in &sorted {
        metadata_lines.push_str(&format!("set {key} {value}\n"));
    }
    let metadata_lines = metadata_lines.trim_end().to_string();

    let mut kernel_args_parts = vec![format!("facility={}", record.facility)];
    for (key, value) in &sorted {
        kernel_args_parts.push(format!("{key}={value}"));
    }
    kernel_args_parts.extend(config.extra_kernel_args.iter().cloned());
    let kernel_args = kernel_args_parts.join(" ");

    let mut env = Environment::new();
    env.add_template("auto.ipxe", SCRIPT_TEMPLATE)?;
    let tmpl = env.get_template("auto.ipxe")?;

    tmpl.render(context! {
        mac,
        base_url => config.osie_base_url,
        syslog_host => config.syslog_host,
        tinkerbell => config.tinkerbell_url,
        metadata_lines,
        kernel_url,
        initrd_url,
        kernel_args,
    })
}
