use std::{fs::File, io::Read, path::Path};

use pingops_jobs::Record;

use crate::error::ConsoleError;

pub fn load_records(path: &Path) -> Result<Vec<Record>, ConsoleError> {
    let file = File::open(path)?;
    parse_records(file)
}

pub fn parse_records<R: Read>(reader: R) -> Result<Vec<Record>, ConsoleError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .filter(|(_, value)| !value.is_empty())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect();
        if !record.is_empty() {
            records.push(record);
        }
    }

    if records.is_empty() {
        return Err(ConsoleError::InvalidInput(
            "csv file contains no records".to_string(),
        ));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::parse_records;

    #[test]
    fn rows_become_records_keyed_by_header() {
        let csv = "\u{feff}username,email,firstName\nada,ada@example.com,Ada\n , , \ngrace,,Grace\n";
        let records = parse_records(csv.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("username"), Some("ada"));
        assert_eq!(records[0].get("email"), Some("ada@example.com"));
        assert_eq!(records[1].get("email"), None);
        assert_eq!(records[1].label(1), "grace");
    }

    #[test]
    fn header_only_file_is_rejected() {
        assert!(parse_records("username,email\n".as_bytes()).is_err());
    }
}
