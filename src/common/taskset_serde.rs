use crate::prelude::*;

pub mod prelude {
    pub use super::{
        TasksetFileType,
        TasksetParseError,
        parse_taskset,
    };
}

#[derive(Debug)]
#[derive(Clone, Copy)]
#[derive(PartialEq, Eq)]
#[derive(clap::ValueEnum)]
pub enum TasksetFileType {
    Auto,
    JSON,
    CSV,
}

#[derive(Debug)]
pub enum TasksetParseError {
    IOError(std::io::Error),
    JSONError(serde_json::Error),
    CSVParseError(String),
}

/// A single row of a taskset JSON document: `{id, lp_exec_ms, hp_exec_ms, deadline_ms?}`.
#[derive(serde::Deserialize)]
struct TaskRecord {
    id: TaskId,
    lp_exec_ms: f64,
    hp_exec_ms: f64,
    #[serde(default)]
    deadline_ms: Option<f64>,
}

impl From<TaskRecord> for Task {
    fn from(record: TaskRecord) -> Self {
        Task::new(
            record.id,
            Time::millis_f64(record.lp_exec_ms),
            Time::millis_f64(record.hp_exec_ms),
            record.deadline_ms.map(Time::millis_f64),
        )
    }
}

/// Load a taskset from `path`, auto-detecting CSV vs JSON by extension
/// unless `typ` names one explicitly.
pub fn parse_taskset(path: &str, typ: TasksetFileType) -> Result<Vec<Task>, TasksetParseError> {
    use TasksetFileType::*;

    let taskset_path = std::path::Path::new(path);
    let format =
        if typ == TasksetFileType::Auto {
            if taskset_path.extension().is_some_and(|ext| ext == "json") {
                TasksetFileType::JSON
            } else {
                TasksetFileType::CSV
            }
        } else { typ };

    let taskset_data = std::fs::read_to_string(taskset_path)?;

    let taskset = match format {
        Auto => unreachable!("Auto resolved to a concrete format above"),
        JSON => {
            let records: Vec<TaskRecord> = serde_json::from_str(&taskset_data)?;
            records.into_iter().map(Task::from).collect()
        },
        CSV => csv_deserialize_taskset(&taskset_data)?,
    };

    Ok(taskset)
}

fn csv_deserialize_taskset(data: &str) -> Result<Vec<Task>, TasksetParseError> {
    data.trim_ascii()
        .lines()
        .filter(|line| !line.trim_ascii().is_empty())
        .map(csv_deserialize_task)
        .collect()
}

fn csv_deserialize_task(line: &str) -> Result<Task, TasksetParseError> {
    let fields: Vec<&str> = line.trim_ascii().split(',').map(str::trim).collect();

    if fields.len() != 3 && fields.len() != 4 {
        return Err(TasksetParseError::CSVParseError(format!(
            "Task parsing requires 'id, lp_exec, hp_exec[, deadline]', got {} field(s)", fields.len()
        )));
    }

    let id: TaskId = fields[0].parse()
        .map_err(|err| TasksetParseError::CSVParseError(format!("Failed to parse field 'id': {err}")))?;
    let lp_exec: f64 = fields[1].parse()
        .map_err(|err| TasksetParseError::CSVParseError(format!("Failed to parse field 'lp_exec': {err}")))?;
    let hp_exec: f64 = fields[2].parse()
        .map_err(|err| TasksetParseError::CSVParseError(format!("Failed to parse field 'hp_exec': {err}")))?;
    let deadline = fields.get(3)
        .map(|field| field.parse::<f64>()
            .map_err(|err| TasksetParseError::CSVParseError(format!("Failed to parse field 'deadline': {err}")))
        )
        .transpose()?;

    Ok(Task::new(
        id,
        Time::millis_f64(lp_exec),
        Time::millis_f64(hp_exec),
        deadline.map(Time::millis_f64),
    ))
}

// =============================================================================

impl std::fmt::Display for TasksetParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Taskset Parse Error, ")?;
        match self {
            TasksetParseError::IOError(error) => write!(f, "IO: {error}")?,
            TasksetParseError::JSONError(error) => write!(f, "JSON: {error}")?,
            TasksetParseError::CSVParseError(error) => write!(f, "CSV: {error}")?,
        };

        Ok(())
    }
}

impl std::error::Error for TasksetParseError {}

impl From<std::io::Error> for TasksetParseError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<serde_json::Error> for TasksetParseError {
    fn from(value: serde_json::Error) -> Self {
        Self::JSONError(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_parses_fest_rows_without_deadline() {
        let taskset = csv_deserialize_taskset("0, 25, 20\n1, 22, 15\n").unwrap();

        assert_eq!(taskset.len(), 2);
        assert_eq!(taskset[0].id, 0);
        assert_eq!(taskset[0].lp_exec, Time::millis(25));
        assert_eq!(taskset[0].hp_exec, Time::millis(20));
        assert_eq!(taskset[0].deadline, None);
    }

    #[test]
    fn csv_parses_ensure_rows_with_deadline() {
        let taskset = csv_deserialize_taskset("0, 30, 24, 100\n").unwrap();

        assert_eq!(taskset[0].deadline, Some(Time::millis(100)));
    }

    #[test]
    fn csv_rejects_malformed_rows() {
        assert!(csv_deserialize_taskset("0, 30\n").is_err());
    }
}
