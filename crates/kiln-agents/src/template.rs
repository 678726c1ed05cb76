//! Placeholder rendering for tasks that read staged inputs

use kiln_core::TaskTemplate;

/// Staged inputs file, relative to the output prefix
pub const INPUTS_FILE: &str = "inputs.pb";

/// Staged outputs file, relative to the output prefix
pub const OUTPUTS_FILE: &str = "output/outputs.pb";

/// Raw data directory, relative to the output prefix
pub const RAW_OUTPUT_DIR: &str = "raw_output";

/// Replace container arg placeholders with paths under `output_prefix`
///
/// Supported placeholders: `{{.input}}`, `{{.inputPrefix}}`,
/// `{{.outputPrefix}}` and `{{.rawOutputDataPrefix}}`.
pub fn render_task_template(template: &TaskTemplate, output_prefix: &str) -> TaskTemplate {
    let prefix = output_prefix.trim_end_matches('/');
    let substitutions = [
        ("{{.input}}", format!("{}/{}", prefix, INPUTS_FILE)),
        ("{{.inputPrefix}}", prefix.to_string()),
        ("{{.outputPrefix}}", prefix.to_string()),
        ("{{.rawOutputDataPrefix}}", format!("{}/{}", prefix, RAW_OUTPUT_DIR)),
    ];

    let mut rendered = template.clone();
    if let Some(container) = rendered.container.as_mut() {
        for arg in container.args.iter_mut() {
            for (placeholder, value) in &substitutions {
                if arg.contains(placeholder) {
                    *arg = arg.replace(placeholder, value);
                }
            }
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::Container;

    #[test]
    fn test_render_replaces_placeholders() {
        let template = TaskTemplate::new("wf.train", "python-task").with_container(Container {
            image: "trainer:latest".to_string(),
            args: vec![
                "execute".to_string(),
                "--inputs".to_string(),
                "{{.input}}".to_string(),
                "--output-prefix".to_string(),
                "{{.outputPrefix}}".to_string(),
                "--raw-output-data-prefix={{.rawOutputDataPrefix}}".to_string(),
            ],
            env: Default::default(),
        });

        let rendered = render_task_template(&template, "/stage/abc/");
        let args = &rendered.container.unwrap().args;
        assert_eq!(args[2], "/stage/abc/inputs.pb");
        assert_eq!(args[4], "/stage/abc");
        assert_eq!(args[5], "--raw-output-data-prefix=/stage/abc/raw_output");
        assert_eq!(args[0], "execute");
    }

    #[test]
    fn test_render_without_container_is_identity() {
        let template = TaskTemplate::new("q", "bigquery");
        assert_eq!(render_task_template(&template, "/stage/x"), template);
    }
}
