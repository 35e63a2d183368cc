use crate::parser::types::{data_row_suffix, ROOT_FOLDER};
use crate::runner::state::{IterationRecord, RequestResult};
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub const JUNIT_FILE_NAME: &str = "junit.xml";

/// Generate the JUnit XML document for a run: one testcase per folder bucket
/// of every iteration
pub fn generate_junit_xml(collection_name: &str, records: &[IterationRecord]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let buckets: Vec<(&IterationRecord, &str, &[RequestResult])> = records
        .iter()
        .flat_map(|record| {
            record
                .results
                .iter()
                .map(move |(folder, results)| (record, folder.as_str(), results.as_slice()))
        })
        .collect();

    let failures = buckets
        .iter()
        .filter(|(_, _, results)| results.iter().any(|r| !r.passed()))
        .count();
    let total_ms: u64 = buckets
        .iter()
        .flat_map(|(_, _, results)| results.iter())
        .map(|r| r.time)
        .sum();

    let mut suite_start = BytesStart::new("testsuite");
    suite_start.push_attribute(("name", collection_name));
    suite_start.push_attribute(("tests", buckets.len().to_string().as_str()));
    suite_start.push_attribute(("failures", failures.to_string().as_str()));
    suite_start.push_attribute(("time", seconds(total_ms).as_str()));
    suite_start.push_attribute((
        "timestamp",
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string().as_str(),
    ));
    writer.write_event(Event::Start(suite_start))?;

    for (record, folder, results) in &buckets {
        write_test_case(&mut writer, collection_name, record, folder, results)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;

    let result = writer.into_inner().into_inner();
    let xml = String::from_utf8(result)?;
    Ok(xml)
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    collection_name: &str,
    record: &IterationRecord,
    folder: &str,
    results: &[RequestResult],
) -> Result<()> {
    let name = format!(
        "{}{}",
        if folder == ROOT_FOLDER { collection_name } else { folder },
        data_row_suffix(&record.data)
    );
    let time_ms: u64 = results.iter().map(|r| r.time).sum();

    let mut case_start = BytesStart::new("testcase");
    case_start.push_attribute(("classname", collection_name));
    case_start.push_attribute(("name", name.as_str()));
    case_start.push_attribute(("time", seconds(time_ms).as_str()));
    writer.write_event(Event::Start(case_start))?;

    let failing: Vec<&RequestResult> = results.iter().filter(|r| !r.passed()).collect();
    if let Some(first) = failing.first() {
        let mut fail_start = BytesStart::new("failure");
        fail_start.push_attribute(("message", failure_message(first, &failing).as_str()));
        writer.write_event(Event::Start(fail_start))?;
        writer.write_event(Event::Text(BytesText::new(&pretty_join(&failing)?)))?;
        writer.write_event(Event::End(BytesEnd::new("failure")))?;
    }

    let all: Vec<&RequestResult> = results.iter().collect();
    writer.write_event(Event::Start(BytesStart::new("system-out")))?;
    writer.write_event(Event::Text(BytesText::new(&pretty_join(&all)?)))?;
    writer.write_event(Event::End(BytesEnd::new("system-out")))?;

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// `"<first failed tests> <code> <body> -- <failed tests of every failing result>"`
fn failure_message(first: &RequestResult, failing: &[&RequestResult]) -> String {
    let all_failed = failing
        .iter()
        .map(|r| r.failed_tests().join(", "))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "{} {} {} -- {}",
        first.failed_tests().join(", "),
        first.response_code.code,
        first.response_body,
        all_failed
    )
}

fn pretty_join(results: &[&RequestResult]) -> Result<String> {
    let parts = results
        .iter()
        .map(|r| serde_json::to_string_pretty(r))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join("\n"))
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

/// Write `junit.xml` into `output_dir`
pub fn write_report(
    collection_name: &str,
    records: &[IterationRecord],
    output_dir: &Path,
) -> Result<PathBuf> {
    let xml = generate_junit_xml(collection_name, records)?;
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(JUNIT_FILE_NAME);
    std::fs::write(&path, xml)?;
    log::info!("Generated JUnit report: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::KeyValue;
    use crate::runner::state::sample_result;

    fn records() -> Vec<IterationRecord> {
        let mut first = IterationRecord::new(1, "Shop", vec![KeyValue::new("x", "1")]);
        first.push("F", sample_result("a", 1500, &[("status ok", true)]));
        first.push("root", sample_result("c", 500, &[]));

        let mut second = IterationRecord::new(2, "Shop", vec![KeyValue::new("x", "2")]);
        second.push(
            "F",
            sample_result("a", 200, &[("status ok", false), ("has body", false)]),
        );
        second.push("F", sample_result("b", 300, &[("status ok", false)]));
        second.push("root", sample_result("c", 100, &[("fine", true)]));

        vec![first, second]
    }

    #[test]
    fn test_generate_junit_xml() {
        let xml = generate_junit_xml("Shop", &records()).expect("Failed to generate XML");

        assert!(xml.contains(r#"<testsuite name="Shop""#));
        assert!(xml.contains(r#"tests="4""#));
        assert!(xml.contains(r#"failures="1""#));
        assert!(xml.contains(r#"<testcase classname="Shop" name="F[x:1]" time="1.500""#));
        assert!(xml.contains(r#"name="Shop[x:1]""#));
        assert!(xml.contains(r#"name="F[x:2]""#));
        assert_eq!(xml.matches("<failure").count(), 1);
        assert_eq!(xml.matches("<system-out>").count(), 4);
    }

    #[test]
    fn test_failure_message() {
        let records = records();
        let failing: Vec<&RequestResult> = records[1].results["F"].iter().collect();

        let message = failure_message(failing[0], &failing);

        assert!(message.starts_with("status ok, has body 200 "));
        assert!(message.ends_with(" -- status ok, has body,status ok"));
    }

    #[test]
    fn test_write_report_uses_fixed_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report("Shop", &records(), &dir.path().join("reports")).unwrap();

        assert_eq!(path, dir.path().join("reports").join(JUNIT_FILE_NAME));
        let xml = std::fs::read_to_string(path).unwrap();
        assert!(xml.starts_with("<?xml"));
    }
}
