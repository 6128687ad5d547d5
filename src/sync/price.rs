/// Converts source-currency price strings into target-currency amounts.
/// Injected wherever prices cross the boundary so the exchange rate lives in
/// exactly one place.
#[derive(Debug, Clone)]
pub struct PriceConverter {
    rate: f64,
}

impl PriceConverter {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }

    /// Divide by the rate and round up to the next whole unit. Empty or
    /// non-numeric input passes through unchanged so upstream data problems
    /// stay visible instead of turning into zeros.
    pub fn convert(&self, price: &str) -> String {
        let trimmed = price.trim();
        if trimmed.is_empty() {
            return String::new();
        }
        let numeric: Result<f64, _> = trimmed.replace(',', ".").parse();
        match numeric {
            Ok(value) if self.rate > 0.0 => {
                let converted = (value / self.rate).ceil();
                format!("{:.0}", converted)
            }
            _ => price.to_string(),
        }
    }

    /// Convert only when a value is present; `None` stays `None`.
    pub fn convert_opt(&self, price: &str) -> Option<String> {
        let trimmed = price.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(self.convert(trimmed))
        }
    }
}
