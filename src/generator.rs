//! Synthetic retail transactions.
//!
//! Builds the flattened transaction view directly in memory: stores in five
//! cities, their staff, a weighted product catalogue, a member pool and a year
//! of daily traffic with weekend and peak-hour bias.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc, Weekday};
use rand::distributions::{Distribution, WeightedError, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;
use tracing::info;

use crate::dataset::{Dataset, DatasetError, Row, Value};
use crate::schema::Schema;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("invalid sampling weights: {0}")]
    Weights(#[from] WeightedError),

    #[error("{days} days before {end} is outside the supported date range")]
    DateRange { end: NaiveDate, days: i64 },

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// `end` minus `days`, failing instead of overflowing the calendar
fn days_before(end: NaiveDate, days: i64) -> Result<NaiveDate, GeneratorError> {
    end.checked_sub_signed(TimeDelta::days(days))
        .ok_or(GeneratorError::DateRange { end, days })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub seed: u64,
    /// Number of days of transactions, ending the day before `end_date`
    pub days: u32,
    pub members: usize,
    /// Extra products with random names, prices and popularity
    pub random_products: usize,
    /// Defaults to today
    pub end_date: Option<NaiveDate>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            days: 365,
            members: 200,
            random_products: 200,
            end_date: None,
        }
    }
}

const CITIES: [&str; 5] = ["Bandung", "Jakarta Selatan", "Surabaya", "Yogyakarta", "Semarang"];
const STORES_PER_CITY: usize = 3;

const HEAD_POSITION: &str = "Kepala Toko";
const STAFF_POSITIONS: [&str; 2] = ["Kasir", "Pramuniaga"];

const FIRST_NAMES: [&str; 20] = [
    "Budi", "Siti", "Agus", "Dewi", "Rizky", "Putri", "Andi", "Wulan", "Eko", "Rina",
    "Fajar", "Indah", "Hendra", "Maya", "Yusuf", "Lestari", "Dimas", "Ayu", "Bayu", "Nur",
];
const LAST_NAMES: [&str; 16] = [
    "Santoso", "Wijaya", "Saputra", "Hidayat", "Kusuma", "Pratama", "Nugroho", "Lestari",
    "Setiawan", "Utami", "Siregar", "Halim", "Gunawan", "Permata", "Rahman", "Susanto",
];

/// (name, category, price, popularity)
const CATALOGUE: [(&str, &str, u32, u32); 30] = [
    ("Air Mineral 600ml", "Minuman", 3500, 10),
    ("Mie Instan Goreng", "Makanan", 3000, 10),
    ("Roti Sobek Cokelat", "Makanan", 12000, 8),
    ("Teh Kotak 250ml", "Minuman", 4000, 9),
    ("Kopi Sachet Instan", "Minuman", 1500, 9),
    ("Snack Kentang Asin", "Makanan", 10000, 7),
    ("Sabun Mandi Batang", "Pembersih", 4500, 5),
    ("Deterjen Bubuk 800g", "Pembersih", 18000, 3),
    ("Parfum Roll-on 50ml", "Kosmetik", 22000, 2),
    ("Baterai AA (2pcs)", "Lainnya", 15000, 2),
    ("Lipstik Matte Red", "Kosmetik", 45000, 1),
    ("Susu UHT 1L", "Minuman", 17000, 7),
    ("Biskuit Cokelat", "Makanan", 9000, 6),
    ("Permen Mint", "Makanan", 2500, 5),
    ("Minyak Goreng 1L", "Makanan", 18000, 8),
    ("Tissue Basah", "Pembersih", 12000, 4),
    ("Shampoo Sachet", "Pembersih", 2000, 6),
    ("Masker Wajah", "Kosmetik", 12000, 3),
    ("Hand Sanitizer 100ml", "Pembersih", 10000, 4),
    ("Pasta Gigi 75g", "Pembersih", 9000, 6),
    ("Susu Kental Manis", "Minuman", 8000, 7),
    ("Keripik Singkong", "Makanan", 8000, 6),
    ("Sarden Kaleng", "Makanan", 15000, 4),
    ("Minuman Isotonik", "Minuman", 8000, 6),
    ("Kopi Botol 220ml", "Minuman", 7000, 5),
    ("Body Lotion", "Kosmetik", 25000, 2),
    ("Pulpen Biru", "Lainnya", 4000, 3),
    ("Lampu LED 7W", "Lainnya", 15000, 2),
    ("Payung Lipat", "Lainnya", 35000, 1),
    ("Powerbank 5000mAh", "Lainnya", 75000, 1),
];

const CATEGORIES: [&str; 5] = ["Makanan", "Minuman", "Pembersih", "Kosmetik", "Lainnya"];
const PRODUCT_PREFIXES: [&str; 10] = ["Super", "Fresh", "Best", "Top", "Ultra", "Mega", "Eco", "Smart", "Quick", "Happy"];
const PRODUCT_KINDS: [&str; 10] = ["Snack", "Drink", "Soap", "Shampoo", "Juice", "Tea", "Coffee", "Biscuit", "Candy", "Cream"];
const PRODUCT_SIZES: [&str; 8] = ["100g", "200g", "250ml", "500ml", "1L", "3pcs", "5pcs", "1kg"];

const PEAK_HOURS: [u32; 6] = [8, 9, 12, 13, 18, 19];
/// Items per basket 1..=5
const BASKET_WEIGHTS: [f64; 5] = [0.2, 0.4, 0.3, 0.05, 0.05];
const PEAK_HOUR_SHARE: f64 = 0.6;
const MEMBER_SHARE: f64 = 0.6;

struct Store {
    name: String,
    city: &'static str,
    staff: Vec<Staff>,
}

struct Staff {
    name: String,
    position: &'static str,
}

struct Product {
    name: String,
    category: &'static str,
    price: f64,
}

struct Member {
    name: String,
    joined: NaiveDateTime,
}

fn person_name(rng: &mut StdRng) -> String {
    let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Budi");
    let last = LAST_NAMES.choose(rng).copied().unwrap_or("Santoso");
    format!("{} {}", first, last)
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn stores(rng: &mut StdRng) -> Vec<Store> {
    let mut stores = Vec::with_capacity(CITIES.len() * STORES_PER_CITY);
    for city in CITIES {
        let short = city.split_whitespace().next().unwrap_or(city);
        for n in 1..=STORES_PER_CITY {
            let mut staff = vec![Staff { name: person_name(rng), position: HEAD_POSITION }];
            for _ in 0..rng.gen_range(3..=5) {
                let position = STAFF_POSITIONS.choose(rng).copied().unwrap_or(STAFF_POSITIONS[0]);
                staff.push(Staff { name: person_name(rng), position });
            }
            stores.push(Store { name: format!("Toko {} {}", short, n), city, staff });
        }
    }
    stores
}

fn products(rng: &mut StdRng, random_products: usize) -> (Vec<Product>, Vec<u32>) {
    let mut products = Vec::with_capacity(CATALOGUE.len() + random_products);
    let mut weights = Vec::with_capacity(products.capacity());

    for (name, category, price, popularity) in CATALOGUE {
        products.push(Product { name: name.to_string(), category, price: price as f64 });
        weights.push(popularity);
    }
    for _ in 0..random_products {
        let name = format!(
            "{} {} {}",
            PRODUCT_PREFIXES.choose(rng).copied().unwrap_or("Super"),
            PRODUCT_KINDS.choose(rng).copied().unwrap_or("Snack"),
            PRODUCT_SIZES.choose(rng).copied().unwrap_or("100g"),
        );
        let category = CATEGORIES.choose(rng).copied().unwrap_or("Lainnya");
        products.push(Product { name, category, price: rng.gen_range(2000u32..=100_000) as f64 });
        weights.push(rng.gen_range(1..=10));
    }
    (products, weights)
}

/// Members joined between three years and one month before `end`
fn members(rng: &mut StdRng, count: usize, end: NaiveDate) -> Result<Vec<Member>, GeneratorError> {
    (0..count)
        .map(|_| {
            let joined = days_before(end, rng.gen_range(30..=3 * 365))?;
            Ok(Member { name: person_name(rng), joined: midnight(joined) })
        })
        .collect()
}

fn transaction_time(rng: &mut StdRng, date: NaiveDate) -> NaiveDateTime {
    let start = midnight(date);
    if rng.gen_bool(PEAK_HOUR_SHARE) {
        let hour = PEAK_HOURS.choose(rng).copied().unwrap_or(12);
        start + TimeDelta::hours(hour as i64) + TimeDelta::minutes(rng.gen_range(0..60))
    } else {
        start + TimeDelta::seconds(rng.gen_range(0..86_400))
    }
}

/// Generates the flattened transaction view described by [`Schema::retail`].
///
/// The categorical fields carry their distinct values as list values.
pub fn generate(config: &GeneratorConfig) -> Result<Dataset, GeneratorError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let end = config.end_date.unwrap_or_else(|| Utc::now().date_naive());
    let start = days_before(end, i64::from(config.days))?;

    let stores = stores(&mut rng);
    let (products, product_weights) = products(&mut rng, config.random_products);
    let members = members(&mut rng, config.members, end)?;

    let product_index = WeightedIndex::new(&product_weights)?;
    let basket_size = WeightedIndex::new(BASKET_WEIGHTS)?;

    let mut rows: Vec<Row> = Vec::new();
    let mut transaction_id = 0u64;

    for offset in 0..i64::from(config.days) {
        let date = start + TimeDelta::days(offset);
        let traffic = match date.weekday() {
            Weekday::Sat | Weekday::Sun => rng.gen_range(40..=60),
            _ => rng.gen_range(20..=30),
        };

        for _ in 0..traffic {
            transaction_id += 1;
            let time = transaction_time(&mut rng, date);
            let Some(store) = stores.choose(&mut rng) else { continue };
            let Some(staff) = store.staff.choose(&mut rng) else { continue };
            let member = if rng.gen_bool(MEMBER_SHARE) { members.choose(&mut rng) } else { None };

            let mut bought = HashSet::new();
            for _ in 0..=basket_size.sample(&mut rng) {
                let index = product_index.sample(&mut rng);
                // A product appears once per basket
                if !bought.insert(index) {
                    continue;
                }
                let product = &products[index];
                let quantity = rng.gen_range(1u32..=3) as f64;

                rows.push(vec![
                    Value::Number(transaction_id as f64),
                    Value::Date(time),
                    Value::Text(store.name.clone()),
                    Value::Text(store.city.to_string()),
                    Value::Text(staff.name.clone()),
                    Value::Text(staff.position.to_string()),
                    Value::Text(product.name.clone()),
                    Value::Text(product.category.to_string()),
                    Value::Number(product.price),
                    Value::Number(quantity),
                    Value::Number(product.price),
                    Value::Number(quantity * product.price),
                    member.map_or(Value::Null, |m| Value::Text(m.name.clone())),
                    member.map_or(Value::Null, |m| Value::Date(m.joined)),
                ]);
            }
        }
    }

    let mut schema = Schema::retail();
    for field in ["nama_toko", "kota", "posisi_karyawan", "kategori_produk"] {
        let Some(index) = schema.index_of(field) else { continue };
        let values: BTreeSet<String> = rows
            .iter()
            .filter_map(|row| match &row[index] {
                Value::Text(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        schema.set_list_values(field, values.into_iter().collect());
    }

    info!(
        transactions = transaction_id,
        rows = rows.len(),
        seed = config.seed,
        "generated synthetic transactions"
    );
    Ok(Dataset::new(schema, rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> GeneratorConfig {
        GeneratorConfig {
            seed: 7,
            days: 14,
            members: 25,
            random_products: 20,
            end_date: NaiveDate::from_ymd_opt(2024, 6, 1),
        }
    }

    #[test]
    fn test_same_seed_same_data() {
        let a = generate(&small()).unwrap();
        let b = generate(&small()).unwrap();
        assert_eq!(a.rows(), b.rows());

        let other = generate(&GeneratorConfig { seed: 8, ..small() }).unwrap();
        assert_ne!(a.rows(), other.rows());
    }

    #[test]
    fn test_rows_follow_retail_schema() {
        let data = generate(&small()).unwrap();
        assert!(!data.is_empty());
        let total = data.schema().index_of("total_harga_item").unwrap();
        let qty = data.schema().index_of("jumlah_item").unwrap();
        let price = data.schema().index_of("harga_saat_transaksi").unwrap();
        for row in data.rows() {
            assert_eq!(row.len(), 14);
            let q = row[qty].as_number().unwrap();
            assert!((1.0..=3.0).contains(&q));
            assert_eq!(row[total].as_number(), Some(q * row[price].as_number().unwrap()));
        }
    }

    #[test]
    fn test_some_transactions_have_no_member() {
        let data = generate(&small()).unwrap();
        let anonymous = data.query("nama_member.isnull()").unwrap().len();
        let members = data.query("nama_member.notnull() & tanggal_join_member.notnull()").unwrap().len();
        assert!(anonymous > 0);
        assert!(members > anonymous);
        assert_eq!(anonymous + members, data.len());
    }

    #[test]
    fn test_categorical_fields_list_their_values() {
        let data = generate(&small()).unwrap();
        let kota = data.schema().field("kota").unwrap();
        assert!(kota.list_values.iter().all(|c| CITIES.contains(&c.as_str())));
        assert!(!kota.list_values.is_empty());
        let positions = &data.schema().field("posisi_karyawan").unwrap().list_values;
        assert!(positions.iter().any(|p| p == HEAD_POSITION));
        assert!(data.schema().field("nama_produk").unwrap().list_values.is_empty());
    }

    #[test]
    fn test_dates_stay_inside_window() {
        let data = generate(&small()).unwrap();
        let end = midnight(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let start = end - TimeDelta::days(14);
        for row in data.rows() {
            let Value::Date(at) = row[1] else { panic!("waktu_transaksi is not a date") };
            assert!(at >= start && at < end);
        }
    }

    #[test]
    fn test_window_outside_calendar_is_an_error() {
        let config = GeneratorConfig { days: u32::MAX, ..small() };
        assert!(matches!(generate(&config), Err(GeneratorError::DateRange { .. })));

        let config = GeneratorConfig { end_date: Some(NaiveDate::MIN), days: 1, ..small() };
        assert!(matches!(generate(&config), Err(GeneratorError::DateRange { .. })));
    }

    #[test]
    fn test_zero_days_is_empty() {
        let data = generate(&GeneratorConfig { days: 0, ..small() }).unwrap();
        assert!(data.is_empty());
    }
}
