//! Configuration types for Markdown-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The three external programs the
//! pipeline drives are described by [`CommandSpec`] values so callers (and
//! tests) can point the pipeline at any compatible tool.

use crate::error::Md2PdfError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

/// Placeholder replaced by the invocation's input path.
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder replaced by the invocation's output path.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";
/// Placeholder replaced by [`ConversionConfig::theme`].
pub const THEME_PLACEHOLDER: &str = "{theme}";

#[cfg(windows)]
const NPX: &str = "npx.cmd";
#[cfg(not(windows))]
const NPX: &str = "npx";

/// An external program plus its argument template.
///
/// Each argument is passed to the OS as-is after placeholder substitution;
/// nothing is ever handed to a shell, so paths containing quotes or spaces
/// stay a single argument.
///
/// # Example
/// ```rust
/// use edgequake_md2pdf::CommandSpec;
///
/// let pandoc = CommandSpec::new("pandoc", ["-f", "gfm", "-o", "{output}", "{input}"]);
/// assert_eq!(pandoc.program, "pandoc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program name (resolved via `PATH`) or path to an executable.
    pub program: String,
    /// Argument template; may contain `{input}`, `{output}` and `{theme}`.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// mermaid-cli via `npx`, rendering `{input}` to an SVG at `{output}`.
    pub fn mermaid_cli() -> Self {
        Self::new(
            NPX,
            [
                "-y",
                "@mermaid-js/mermaid-cli",
                "-i",
                INPUT_PLACEHOLDER,
                "-o",
                OUTPUT_PLACEHOLDER,
                "-t",
                THEME_PLACEHOLDER,
            ],
        )
    }

    /// md-to-pdf via `npx`; writes `<stem>.pdf` next to `{input}`.
    pub fn md_to_pdf() -> Self {
        Self::new(NPX, ["-y", "md-to-pdf", INPUT_PLACEHOLDER])
    }

    /// pandoc reading GitHub-flavoured Markdown, writing straight to `{output}`.
    pub fn pandoc() -> Self {
        Self::new(
            "pandoc",
            ["-f", "gfm", "-o", OUTPUT_PLACEHOLDER, INPUT_PLACEHOLDER],
        )
    }

    /// Substitute placeholders, one argument at a time.
    pub fn render_args(&self, input: &Path, output: Option<&Path>, theme: &str) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.map(|p| p.to_string_lossy());
        self.args
            .iter()
            .map(|arg| {
                let mut arg = arg.replace(INPUT_PLACEHOLDER, &input);
                if let Some(ref out) = output {
                    arg = arg.replace(OUTPUT_PLACEHOLDER, out);
                }
                arg.replace(THEME_PLACEHOLDER, theme)
            })
            .collect()
    }
}

/// The three external programs, in the shape of a JSON toolchain file.
///
/// Missing entries fall back to the defaults.
///
/// ```json
/// {
///   "diagram_renderer": { "program": "mmdc", "args": ["-i", "{input}", "-o", "{output}", "-t", "{theme}"] },
///   "fallback_converter": { "program": "/opt/pandoc/bin/pandoc", "args": ["-o", "{output}", "{input}"] }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub diagram_renderer: CommandSpec,
    pub pdf_renderer: CommandSpec,
    pub fallback_converter: CommandSpec,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            diagram_renderer: CommandSpec::mermaid_cli(),
            pdf_renderer: CommandSpec::md_to_pdf(),
            fallback_converter: CommandSpec::pandoc(),
        }
    }
}

impl ToolchainConfig {
    /// Parse a toolchain from JSON text.
    pub fn from_json(text: &str) -> Result<Self, Md2PdfError> {
        serde_json::from_str(text)
            .map_err(|e| Md2PdfError::InvalidConfig(format!("toolchain JSON: {e}")))
    }
}

/// Configuration for a Markdown-to-PDF conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_md2pdf::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .theme("forest")
///     .concurrency(4)
///     .quiet(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Info-string tag that marks a diagram block. Default: `mermaid`.
    pub diagram_language: String,

    /// Name of the hidden scratch directory created beside the input. Default: `.out`.
    ///
    /// Must be a single plain path component. The directory is never cleaned
    /// up so the per-diagram sources and images can be inspected after a run.
    pub work_dir_name: String,

    /// Visual theme passed to the diagram renderer. Default: `neutral`.
    pub theme: String,

    /// Renders one diagram source file to an SVG. Default: mermaid-cli.
    pub diagram_renderer: CommandSpec,

    /// Primary Markdown-to-PDF renderer. Default: md-to-pdf.
    ///
    /// Expected to write `<stem>.pdf` beside its input; the pipeline never
    /// passes it an output path.
    pub pdf_renderer: CommandSpec,

    /// Fallback converter, tried when the primary renderer fails. Default: pandoc.
    pub fallback_converter: CommandSpec,

    /// Diagrams rendered at once. Default: 1 (document order, one at a time).
    ///
    /// Blocks have no data dependency on each other, so raising this is safe;
    /// results are still consumed in document order and the first failure
    /// aborts the remaining renders.
    pub concurrency: usize,

    /// Kill any external program that runs longer than this. Default: None (wait forever).
    pub command_timeout_secs: Option<u64>,

    /// Suppress the `PDF written: …` line on stdout. Default: false.
    pub quiet: bool,

    /// Receives per-diagram and per-backend progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        let tools = ToolchainConfig::default();
        Self {
            diagram_language: "mermaid".to_string(),
            work_dir_name: ".out".to_string(),
            theme: "neutral".to_string(),
            diagram_renderer: tools.diagram_renderer,
            pdf_renderer: tools.pdf_renderer,
            fallback_converter: tools.fallback_converter,
            concurrency: 1,
            command_timeout_secs: None,
            quiet: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("diagram_language", &self.diagram_language)
            .field("work_dir_name", &self.work_dir_name)
            .field("theme", &self.theme)
            .field("diagram_renderer", &self.diagram_renderer)
            .field("pdf_renderer", &self.pdf_renderer)
            .field("fallback_converter", &self.fallback_converter)
            .field("concurrency", &self.concurrency)
            .field("command_timeout_secs", &self.command_timeout_secs)
            .field("quiet", &self.quiet)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The configured external programs as a [`ToolchainConfig`].
    pub fn toolchain(&self) -> ToolchainConfig {
        ToolchainConfig {
            diagram_renderer: self.diagram_renderer.clone(),
            pdf_renderer: self.pdf_renderer.clone(),
            fallback_converter: self.fallback_converter.clone(),
        }
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn diagram_language(mut self, tag: impl Into<String>) -> Self {
        self.config.diagram_language = tag.into();
        self
    }

    pub fn work_dir_name(mut self, name: impl Into<String>) -> Self {
        self.config.work_dir_name = name.into();
        self
    }

    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.config.theme = theme.into();
        self
    }

    pub fn diagram_renderer(mut self, spec: CommandSpec) -> Self {
        self.config.diagram_renderer = spec;
        self
    }

    pub fn pdf_renderer(mut self, spec: CommandSpec) -> Self {
        self.config.pdf_renderer = spec;
        self
    }

    pub fn fallback_converter(mut self, spec: CommandSpec) -> Self {
        self.config.fallback_converter = spec;
        self
    }

    /// Replace all three programs at once.
    pub fn toolchain(mut self, tools: ToolchainConfig) -> Self {
        self.config.diagram_renderer = tools.diagram_renderer;
        self.config.pdf_renderer = tools.pdf_renderer;
        self.config.fallback_converter = tools.fallback_converter;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    /// `0` disables the timeout.
    pub fn command_timeout_secs(mut self, secs: u64) -> Self {
        self.config.command_timeout_secs = (secs > 0).then_some(secs);
        self
    }

    pub fn quiet(mut self, v: bool) -> Self {
        self.config.quiet = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Md2PdfError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(Md2PdfError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.diagram_language.trim().is_empty() {
            return Err(Md2PdfError::InvalidConfig(
                "Diagram language tag must not be empty".into(),
            ));
        }
        if c.theme.trim().is_empty() {
            return Err(Md2PdfError::InvalidConfig("Theme must not be empty".into()));
        }
        if !is_plain_component(&c.work_dir_name) {
            return Err(Md2PdfError::InvalidConfig(format!(
                "Working directory name must be a single path component, got '{}'",
                c.work_dir_name
            )));
        }
        for (role, spec) in [
            ("diagram renderer", &c.diagram_renderer),
            ("PDF renderer", &c.pdf_renderer),
            ("fallback converter", &c.fallback_converter),
        ] {
            if spec.program.trim().is_empty() {
                return Err(Md2PdfError::InvalidConfig(format!(
                    "The {role} program must not be empty"
                )));
            }
        }
        Ok(self.config)
    }
}

fn is_plain_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn defaults_match_documented_toolchain() {
        let c = ConversionConfig::default();
        assert_eq!(c.work_dir_name, ".out");
        assert_eq!(c.theme, "neutral");
        assert_eq!(c.concurrency, 1);
        assert!(c.command_timeout_secs.is_none());
        assert!(!c.quiet);
        assert_eq!(c.fallback_converter.program, "pandoc");
        assert!(c.pdf_renderer.args.iter().any(|a| a == "md-to-pdf"));
    }

    #[test]
    fn render_args_substitutes_each_argument() {
        let spec = CommandSpec::mermaid_cli();
        let args = spec.render_args(
            &PathBuf::from("/docs/it's here/diagram_1.mmd"),
            Some(&PathBuf::from("/docs/it's here/diagram_1.svg")),
            "neutral",
        );
        assert_eq!(args.len(), spec.args.len());
        assert!(args.contains(&"/docs/it's here/diagram_1.mmd".to_string()));
        assert!(args.contains(&"/docs/it's here/diagram_1.svg".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("neutral"));
    }

    #[test]
    fn render_args_leaves_output_placeholder_without_output() {
        let spec = CommandSpec::new("tool", ["{input}", "{output}"]);
        let args = spec.render_args(&PathBuf::from("/a.md"), None, "x");
        assert_eq!(args, vec!["/a.md".to_string(), "{output}".to_string()]);
    }

    #[test]
    fn builder_rejects_nested_work_dir() {
        for bad in ["", "a/b", "..", "/abs"] {
            let err = ConversionConfig::builder().work_dir_name(bad).build();
            assert!(err.is_err(), "accepted {bad:?}");
        }
        assert!(ConversionConfig::builder()
            .work_dir_name(".scratch")
            .build()
            .is_ok());
    }

    #[test]
    fn builder_rejects_empty_program() {
        let err = ConversionConfig::builder()
            .fallback_converter(CommandSpec::new("  ", Vec::<String>::new()))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("fallback converter"));
    }

    #[test]
    fn zero_timeout_disables() {
        let c = ConversionConfig::builder()
            .command_timeout_secs(0)
            .build()
            .unwrap();
        assert!(c.command_timeout_secs.is_none());
        let c = ConversionConfig::builder()
            .command_timeout_secs(30)
            .build()
            .unwrap();
        assert_eq!(c.command_timeout_secs, Some(30));
    }

    #[test]
    fn toolchain_json_partial_override() {
        let tools = ToolchainConfig::from_json(
            r#"{ "fallback_converter": { "program": "/usr/local/bin/pandoc", "args": ["-o", "{output}", "{input}"] } }"#,
        )
        .unwrap();
        assert_eq!(tools.fallback_converter.program, "/usr/local/bin/pandoc");
        assert_eq!(tools.diagram_renderer, CommandSpec::mermaid_cli());

        let config = ConversionConfig::builder().toolchain(tools.clone()).build().unwrap();
        assert_eq!(config.toolchain(), tools);
    }

    #[test]
    fn toolchain_json_rejects_garbage() {
        assert!(ToolchainConfig::from_json("{ not json").is_err());
    }
}
