// Output generation module

pub mod diagrams;
pub mod report;
pub mod templates;
pub mod test_files;

pub use diagrams::{node_role, DiagramGenerator, NodeRole};
pub use report::{
    GenerationReport, ReportGenerator, RunReport, StageRow, UserFlowsReport, GRAPH_FILE,
    RUN_REPORT_FILE, USER_FLOWS_FILE,
};
pub use templates::TemplateEngine;
pub use test_files::{test_file_path, write_test_file};
