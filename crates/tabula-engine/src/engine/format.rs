use super::value::{ErrorKind, Value, number_to_text};

/// Format a value for display.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Blank => String::new(),
        Value::Number(n) => format_number(*n),
        Value::Text(s) => s.clone(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Error(e) => e.as_code().to_string(),
        Value::Matrix(m) => {
            let rows: Vec<String> = (0..m.rows())
                .map(|r| {
                    m.row(r)
                        .unwrap_or_default()
                        .iter()
                        .map(format_value)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .collect();
            format!("{{{}}}", rows.join("; "))
        }
    }
}

/// Format a number for display.
pub fn format_number(n: f64) -> String {
    if n.is_finite() {
        number_to_text(n)
    } else {
        ErrorKind::TypeMismatch.as_code().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::value::Matrix;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(60.0), "60");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(-2.5), "-2.5");
        assert_eq!(format_number(f64::NAN), "#VALUE!");
    }

    #[test]
    fn test_format_value_tokens() {
        assert_eq!(format_value(&Value::Error(ErrorKind::DivideByZero)), "#DIV/0!");
        assert_eq!(format_value(&Value::Error(ErrorKind::CircularReference)), "#CYCLE!");
        assert_eq!(format_value(&Value::Bool(false)), "FALSE");
        assert_eq!(format_value(&Value::Blank), "");
        assert_eq!(format_value(&Value::text("hi")), "hi");
    }

    #[test]
    fn test_format_matrix() {
        let m = Matrix::from_rows(vec![
            vec![Value::Number(1.0), Value::text("a")],
            vec![Value::Blank, Value::Bool(true)],
        ])
        .unwrap();
        assert_eq!(format_value(&Value::Matrix(m)), "{1, a; , TRUE}");
    }
}
