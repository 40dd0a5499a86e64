use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Daily sales with a slow trend, weekly seasonality and noise.
struct Day {
    date: NaiveDate,
    sales: f64,
    revenue: f64,
    profit: f64,
    customers: u32,
}

fn generate(days: usize, rng: &mut SimpleRng) -> Vec<Day> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
    (0..days)
        .map(|i| {
            let t = i as f64;
            let weekly = (2.0 * std::f64::consts::PI * t / 7.0).sin();
            let sales = (1000.0 + 5.0 * t + 120.0 * weekly + rng.gauss(0.0, 40.0)).max(0.0);
            let revenue = sales * 1.5 + rng.gauss(0.0, 60.0);
            let profit = revenue * 0.2 + rng.gauss(0.0, 25.0);
            let customers = (sales / 20.0 + rng.gauss(0.0, 4.0)).max(0.0).round() as u32;
            Day {
                date: start + Duration::days(i as i64),
                sales,
                revenue,
                profit,
                customers,
            }
        })
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();

    let mut rng = SimpleRng::new(42);
    let days = generate(100, &mut rng);

    let output_path = "example_data.csv";
    let mut writer = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create {output_path}"))?;
    writer.write_record(["Date", "Sales", "Revenue", "Profit", "Customers"])?;
    for day in &days {
        writer.write_record([
            day.date.format("%Y-%m-%d").to_string(),
            format!("{:.2}", day.sales),
            format!("{:.2}", day.revenue),
            format!("{:.2}", day.profit),
            day.customers.to_string(),
        ])?;
    }
    writer.flush().context("Failed to flush CSV writer")?;

    println!("Wrote {} days of sales data to {output_path}", days.len());
    Ok(())
}
