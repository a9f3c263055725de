//! SARIF report listing the methods that fell back to a raw instruction listing.

use std::collections::BTreeSet;

use serde_json::json;
use serde_sarif::sarif::{
    Artifact, Invocation, Location, LogicalLocation, Message, ReportingDescriptor,
    Result as SarifResult, Run, Sarif, Tool, ToolComponent, SCHEMA_URL,
};

use crate::ast::{ClassDeclaration, MemberDeclaration, MethodBody};
use crate::error::ErrorKind;

pub const TOOL_NAME: &str = "declass";

pub(crate) fn method_location(class_name: &str, method_name: &str, descriptor: &str) -> Location {
    let logical = LogicalLocation::builder()
        .name(format!("{class_name}.{method_name}{descriptor}"))
        .kind("function")
        .build();
    Location::builder().logical_locations(vec![logical]).build()
}

fn result_message(text: impl Into<String>) -> Message {
    Message::builder().text(text.into()).build()
}

/// One result per degraded method, nested classes included, in member order.
pub fn degraded_results(classes: &[ClassDeclaration]) -> Vec<SarifResult> {
    let mut results = Vec::new();
    for class in classes {
        collect_degraded(class, &mut results);
    }
    results
}

fn collect_degraded(class: &ClassDeclaration, results: &mut Vec<SarifResult>) {
    for member in &class.members {
        match member {
            MemberDeclaration::Method(method) => {
                let MethodBody::Raw(listing) = &method.body else {
                    continue;
                };
                let message = result_message(format!(
                    "{}{} was emitted as a raw listing: {}",
                    method.name, method.descriptor, listing.message
                ));
                let location =
                    method_location(&class.qualified_name, &method.name, &method.descriptor);
                results.push(
                    SarifResult::builder()
                        .rule_id(listing.reason.rule_id())
                        .message(message)
                        .locations(vec![location])
                        .build(),
                );
            }
            MemberDeclaration::Type(inner) => collect_degraded(inner, results),
            MemberDeclaration::Field(_) => {}
        }
    }
}

/// Wraps results into a single-run SARIF log. Rules are listed for every kind that occurs.
pub fn build_sarif(
    results: Vec<SarifResult>,
    artifacts: Vec<Artifact>,
    invocation: Invocation,
) -> Sarif {
    let rule_ids: BTreeSet<&str> = results
        .iter()
        .filter_map(|result| result.rule_id.as_deref())
        .collect();
    let rules: Vec<ReportingDescriptor> = all_kinds()
        .into_iter()
        .map(ErrorKind::rule_id)
        .filter(|id| rule_ids.contains(id))
        .map(|id| ReportingDescriptor::builder().id(id).build())
        .collect();
    let driver = ToolComponent::builder()
        .name(TOOL_NAME)
        .version(env!("CARGO_PKG_VERSION"))
        .rules(rules)
        .build();
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };
    let run = if artifacts.is_empty() {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .build()
    } else {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .artifacts(artifacts)
            .build()
    };

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

fn all_kinds() -> [ErrorKind; 7] {
    [
        ErrorKind::UnresolvedSymbol,
        ErrorKind::UnificationConflict,
        ErrorKind::MalformedControlFlow,
        ErrorKind::StackSimulation,
        ErrorKind::IrreducibleControlFlow,
        ErrorKind::BudgetExceeded,
        ErrorKind::DeadCode,
    ]
}
