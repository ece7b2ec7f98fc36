use crate::error::CliError;
use model::versioning::dataset::DatasetVersion;

pub fn print_status_json(rows: &[(String, Option<DatasetVersion>)]) -> Result<(), CliError> {
    let versions: Vec<&DatasetVersion> = rows.iter().filter_map(|(_, row)| row.as_ref()).collect();
    println!("{}", serde_json::to_string_pretty(&versions)?);
    Ok(())
}

pub fn print_status_table(rows: &[(String, Option<DatasetVersion>)]) {
    println!("{:<32} {:<12} {:<26} Status", "Dataset", "Version", "Synced at");
    println!("{}", "-".repeat(80));
    for (dataset, row) in rows {
        match row {
            Some(version) => println!(
                "{:<32} {:<12} {:<26} {}",
                dataset,
                version.last_synced_version,
                version.last_sync_date.to_rfc3339(),
                version.sync_status
            ),
            None => println!("{dataset:<32} {:<12} {:<26} never synced", "-", "-"),
        }
    }
}
