//! Fixed-width tables for monospace chat blocks.

/// A column: header and width in characters.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub header: &'static str,
    pub width: usize,
}

pub const fn col(header: &'static str, width: usize) -> Column {
    Column { header, width }
}

/// Fixed-width table. Cells longer than their column are cut, never wrapped.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: &[Column]) -> Self {
        Self {
            columns: columns.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn row<I, S>(&mut self, cells: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn render_line(&self, cells: &[String]) -> String {
        let line = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let cell = cells.get(i).map(String::as_str).unwrap_or("");
                let cut: String = cell.chars().take(column.width).collect();
                format!("{:<width$}", cut, width = column.width)
            })
            .collect::<Vec<_>>()
            .join(" ");
        line.trim_end().to_string()
    }

    /// Render header, separator and rows without the code fence.
    pub fn render_plain(&self) -> String {
        let headers: Vec<String> = self.columns.iter().map(|c| c.header.to_string()).collect();
        let total_width: usize =
            self.columns.iter().map(|c| c.width).sum::<usize>() + self.columns.len().saturating_sub(1);

        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        lines.push(self.render_line(&headers));
        lines.push("-".repeat(total_width));
        for row in &self.rows {
            lines.push(self.render_line(row));
        }
        lines.join("\n")
    }

    /// Render wrapped in a monospace block.
    pub fn render(&self) -> String {
        super::code_block(&self.render_plain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: [Column; 3] = [col("NAME", 12), col("STATUS", 8), col("AGE", 6)];

    fn split_on_columns(line: &str, columns: &[Column]) -> Vec<String> {
        let chars: Vec<char> = line.chars().collect();
        let mut fields = Vec::new();
        let mut start = 0;
        for column in columns {
            let end = (start + column.width).min(chars.len());
            let field: String = chars.get(start.min(chars.len())..end).unwrap_or(&[]).iter().collect();
            fields.push(field.trim_end().to_string());
            start += column.width + 1;
        }
        fields
    }

    #[test]
    fn renders_header_separator_and_fence() {
        let mut table = Table::new(&COLUMNS);
        table.row(["web-1", "Running", "2d 1h"]);
        let out = table.render();
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "```");
        assert_eq!(lines[1], "NAME         STATUS   AGE");
        assert_eq!(lines[2], "-".repeat(28));
        assert_eq!(lines[3], "web-1        Running  2d 1h");
        assert_eq!(lines[4], "```");
    }

    #[test]
    fn fields_survive_resplitting_on_column_boundaries() {
        let rows = [
            ["api-7f9c", "Running", "3h 2m"],
            ["a-very-long-pod-name-indeed", "CrashLoopBackOff", "12s"],
            ["", "Pending", ""],
        ];
        let mut table = Table::new(&COLUMNS);
        for row in &rows {
            table.row(row.iter().copied());
        }
        let plain = table.render_plain();
        let body: Vec<&str> = plain.lines().skip(2).collect();

        for (line, row) in body.iter().zip(rows.iter()) {
            let fields = split_on_columns(line, &COLUMNS);
            for ((field, original), column) in fields.iter().zip(row.iter()).zip(COLUMNS.iter()) {
                let expected: String = original.chars().take(column.width).collect();
                assert_eq!(field, &expected);
            }
        }
    }

    #[test]
    fn long_cells_are_truncated_not_wrapped() {
        let mut table = Table::new(&[col("IMAGE", 5)]);
        table.row(["registry.example.com/app:latest"]);
        let plain = table.render_plain();
        assert_eq!(plain.lines().count(), 3);
        assert_eq!(plain.lines().last(), Some("regis"));
    }
}
