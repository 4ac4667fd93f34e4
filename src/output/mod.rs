mod styling;

use styling::{dim, magenta_bold};

/// Prints the exporter banner to stderr.
///
/// Keeps stdout clean for `collect`, which writes the exposition there.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("pipelinerun-exporter"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Tekton PipelineRun duration metrics")
    );
}
