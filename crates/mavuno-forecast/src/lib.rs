//! Day-of-week seasonal forecasting over daily demand series.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use mavuno_core::{DataPoint, ForecastResult};
use rand::Rng;
use tracing::debug;

pub const CRATE_NAME: &str = "mavuno-forecast";

pub const INSUFFICIENT_DATA: &str = "Insufficient data for forecasting";
pub const STABLE_DEMAND: &str = "Demand is expected to remain stable. Maintain current inventory levels.";

/// Moving-average forecaster. `window` is the trailing slice used for the
/// volatility/confidence calculation; `jitter` is the half-width of the
/// uniform perturbation applied to each projected value, as a fraction of
/// that value. Tests set `jitter` to zero for exact assertions.
#[derive(Debug, Clone, Copy)]
pub struct Forecaster {
    pub window: usize,
    pub jitter: f64,
}

impl Default for Forecaster {
    fn default() -> Self {
        Self {
            window: 7,
            jitter: 0.05,
        }
    }
}

impl Forecaster {
    /// Project the next seven days from a chronologically ordered history.
    /// Histories shorter than the window degrade to a defined sentinel
    /// result rather than an error.
    pub fn forecast<R: Rng>(&self, history: &[DataPoint], rng: &mut R) -> ForecastResult {
        if history.len() < self.window {
            return ForecastResult {
                forecast: Vec::new(),
                confidence: 0,
                recommendation: INSUFFICIENT_DATA.to_string(),
            };
        }

        let window = &history[history.len() - self.window..];
        let average = window.iter().map(|p| p.value).sum::<f64>() / self.window as f64;
        let variance = window
            .iter()
            .map(|p| (p.value - average).powi(2))
            .sum::<f64>()
            / self.window as f64;
        let std_dev = variance.sqrt();

        // An all-zero window makes volatility undefined; treat it as no
        // confidence rather than letting NaN reach the caller.
        let confidence = if average == 0.0 {
            0
        } else {
            let volatility = std_dev / average;
            (100.0 * (1.0 - volatility)).clamp(0.0, 100.0).round() as u8
        };

        let last_date = history[history.len() - 1].date;
        let mut forecast = Vec::with_capacity(7);
        for i in 1..=7i64 {
            let date = last_date + Duration::days(i);
            let mut value = weekday_mean(history, date.weekday()).unwrap_or(average);
            value += (rng.gen::<f64>() - 0.5) * 2.0 * self.jitter * value;
            forecast.push(DataPoint {
                date,
                value: value.round(),
            });
        }

        let first = forecast[0].value;
        let last = forecast[6].value;
        let recommendation = if first == 0.0 {
            // Percent change off a zero base is undefined; report stable.
            STABLE_DEMAND.to_string()
        } else {
            let percent_change = ((last - first) / first * 100.0).abs();
            let trending_up = last > first;
            if trending_up && percent_change > 15.0 {
                format!(
                    "Prepare for {}% higher demand next week. Consider increasing inventory.",
                    percent_change.round()
                )
            } else if !trending_up && percent_change > 15.0 {
                format!(
                    "Prepare {}% fewer perishable items next week to reduce potential waste.",
                    percent_change.round()
                )
            } else {
                STABLE_DEMAND.to_string()
            }
        };

        debug!(points = history.len(), confidence, "forecast computed");
        ForecastResult {
            forecast,
            confidence,
            recommendation,
        }
    }
}

fn weekday_mean(history: &[DataPoint], weekday: Weekday) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for point in history {
        if point.date.weekday() == weekday {
            sum += point.value;
            count += 1;
        }
    }
    (count > 0).then(|| sum / count as f64)
}

/// Synthetic 180-day series with weekend/Friday uplift, a 30-day
/// sinusoidal cycle, and uniform noise. Demo and test data only.
pub fn generate_demo_data<R: Rng>(rng: &mut R) -> Vec<DataPoint> {
    let start = Utc::now() - Duration::days(180);
    (0..180)
        .map(|i| {
            let date = start + Duration::days(i);
            let base = match date.weekday() {
                Weekday::Sat | Weekday::Sun => 150.0,
                Weekday::Fri => 130.0,
                _ => 100.0,
            };
            let month_factor = 1.0 + 0.2 * (2.0 * std::f64::consts::PI * i as f64 / 30.0).sin();
            let random_factor = 0.8 + rng.gen::<f64>() * 0.4;
            DataPoint {
                date,
                value: (base * month_factor * random_factor).round(),
            }
        })
        .collect()
}

/// Parse `date,value` rows after a header line. Rows whose value is not
/// numeric, or whose date cannot be read as RFC 3339 or `YYYY-MM-DD`, are
/// dropped without surfacing an error.
pub fn parse_csv_data(content: &str) -> Vec<DataPoint> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut points = Vec::new();
    for record in reader.records().flatten() {
        let (Some(date_raw), Some(value_raw)) = (record.get(0), record.get(1)) else {
            continue;
        };
        let Ok(value) = value_raw.parse::<f64>() else {
            continue;
        };
        let Some(date) = parse_flexible_date(date_raw) else {
            continue;
        };
        points.push(DataPoint { date, value });
    }
    points
}

/// Render a series as `date,value` CSV; round-trips through
/// [`parse_csv_data`].
pub fn render_csv(points: &[DataPoint]) -> String {
    let mut out = String::from("date,value\n");
    for point in points {
        out.push_str(&format!("{},{}\n", point.date.to_rfc3339(), point.value));
    }
    out
}

fn parse_flexible_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn daily_series(values: &[f64]) -> Vec<DataPoint> {
        let start = Utc.with_ymd_and_hms(2026, 8, 3, 0, 0, 0).single().unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| DataPoint {
                date: start + Duration::days(i as i64),
                value,
            })
            .collect()
    }

    #[test]
    fn short_histories_degrade_to_the_sentinel() {
        let forecaster = Forecaster::default();
        for history in [vec![], daily_series(&[10.0; 6])] {
            let result = forecaster.forecast(&history, &mut rng());
            assert!(result.forecast.is_empty());
            assert_eq!(result.confidence, 0);
            assert_eq!(result.recommendation, INSUFFICIENT_DATA);
        }
    }

    #[test]
    fn seven_strictly_increasing_days_follow_the_last_observation() {
        let history = daily_series(&[100.0, 110.0, 90.0, 105.0, 95.0, 100.0, 102.0]);
        let last = history.last().unwrap().date;
        let result = Forecaster::default().forecast(&history, &mut rng());
        assert_eq!(result.forecast.len(), 7);
        assert_eq!(result.forecast[0].date, last + Duration::days(1));
        for pair in result.forecast.windows(2) {
            assert_eq!(pair[1].date - pair[0].date, Duration::days(1));
        }
        assert!(result.confidence <= 100);
    }

    #[test]
    fn constant_window_has_full_confidence() {
        let history = daily_series(&[80.0; 14]);
        let result = Forecaster::default().forecast(&history, &mut rng());
        assert_eq!(result.confidence, 100);
        assert_eq!(result.recommendation, STABLE_DEMAND);
    }

    #[test]
    fn zero_average_window_reports_zero_confidence() {
        let history = daily_series(&[0.0; 7]);
        let result = Forecaster::default().forecast(&history, &mut rng());
        assert_eq!(result.confidence, 0);
        assert_eq!(result.recommendation, STABLE_DEMAND);
    }

    #[test]
    fn forecast_values_come_from_weekday_means_when_jitter_is_off() {
        // One observation per weekday, so each projected day copies the
        // value of the observation seven days earlier.
        let forecaster = Forecaster {
            jitter: 0.0,
            ..Forecaster::default()
        };
        let history = daily_series(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0]);
        let result = forecaster.forecast(&history, &mut rng());
        let values: Vec<f64> = result.forecast.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0]);
    }

    #[test]
    fn rising_trend_selects_the_higher_demand_template() {
        let forecaster = Forecaster {
            jitter: 0.0,
            ..Forecaster::default()
        };
        let history = daily_series(&[100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 120.0]);
        let result = forecaster.forecast(&history, &mut rng());
        assert_eq!(result.forecast[0].value, 100.0);
        assert_eq!(result.forecast[6].value, 120.0);
        assert_eq!(
            result.recommendation,
            "Prepare for 20% higher demand next week. Consider increasing inventory."
        );
    }

    #[test]
    fn falling_trend_selects_the_waste_reduction_template() {
        let forecaster = Forecaster {
            jitter: 0.0,
            ..Forecaster::default()
        };
        let history = daily_series(&[100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 80.0]);
        let result = forecaster.forecast(&history, &mut rng());
        assert_eq!(
            result.recommendation,
            "Prepare 20% fewer perishable items next week to reduce potential waste."
        );
    }

    #[test]
    fn small_swings_read_as_stable() {
        let forecaster = Forecaster {
            jitter: 0.0,
            ..Forecaster::default()
        };
        let history = daily_series(&[100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 110.0]);
        let result = forecaster.forecast(&history, &mut rng());
        assert_eq!(result.recommendation, STABLE_DEMAND);
    }

    #[test]
    fn jitter_stays_within_five_percent_of_the_seasonal_mean() {
        let history = daily_series(&[100.0; 28]);
        let result = Forecaster::default().forecast(&history, &mut rng());
        for point in &result.forecast {
            assert!(point.value >= 95.0 && point.value <= 105.0, "value {}", point.value);
        }
    }

    #[test]
    fn demo_series_spans_180_days() {
        let data = generate_demo_data(&mut rng());
        assert_eq!(data.len(), 180);
        for pair in data.windows(2) {
            assert!(pair[1].date > pair[0].date);
        }
        assert!(data.iter().all(|p| p.value > 0.0 && p.value.fract() == 0.0));
    }

    #[test]
    fn csv_round_trips_the_demo_series() {
        let data = generate_demo_data(&mut rng());
        let parsed = parse_csv_data(&render_csv(&data));
        assert_eq!(parsed, data);
    }

    #[test]
    fn unparseable_values_are_dropped_silently() {
        let csv = "date,value\n2026-08-01,120\n2026-08-02,not-a-number\nnot-a-date,5\n2026-08-03T00:00:00Z,90\n";
        let parsed = parse_csv_data(csv);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].value, 120.0);
        assert_eq!(parsed[1].value, 90.0);
    }
}
