use chrono::NaiveDate;
use forecast_pipeline::config::MonthTable;
use forecast_pipeline::ingest::RawPoint;
use forecast_pipeline::normalize::normalize_value;
use forecast_pipeline::{DateGrammar, DateNormalizer, ForecastError};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn normalizer() -> DateNormalizer {
    DateNormalizer::new(MonthTable::default())
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[rstest]
#[case("Mar.2023", date(2023, 3, 1))]
#[case("Abr.2023", date(2023, 4, 1))]
#[case("Ene.1999", date(1999, 1, 1))]
#[case("ago.2021", date(2021, 8, 1))]
#[case("Dic23", date(2023, 12, 1))]
#[case("Sep24", date(2024, 9, 1))]
fn test_monthly_grammar(#[case] input: &str, #[case] expected: NaiveDate) {
    assert_eq!(
        normalizer().parse(input, DateGrammar::Monthly).unwrap(),
        expected
    );
}

#[rstest]
#[case("05 Mar.25", date(2025, 3, 5))]
#[case("05.Mar.25", date(2025, 3, 5))]
#[case("31 Dic.24", date(2024, 12, 31))]
#[case("01 Ene.00", date(2000, 1, 1))]
fn test_daily_grammar(#[case] input: &str, #[case] expected: NaiveDate) {
    assert_eq!(
        normalizer().parse(input, DateGrammar::Daily).unwrap(),
        expected
    );
}

#[rstest]
#[case("Xyz.2023", DateGrammar::Monthly)]
#[case("Invalid.2023", DateGrammar::Monthly)]
#[case("Mar.20x3", DateGrammar::Monthly)]
#[case("Ma", DateGrammar::Monthly)]
#[case("5 Mar.25", DateGrammar::Daily)]
#[case("32 Ene.25", DateGrammar::Daily)]
#[case("05 Foo.25", DateGrammar::Daily)]
#[case("05 Mar.2025", DateGrammar::Daily)]
fn test_bad_periods_are_format_errors(#[case] input: &str, #[case] grammar: DateGrammar) {
    match normalizer().parse(input, grammar) {
        Err(ForecastError::FormatError { input: offending, .. }) => assert_eq!(offending, input),
        other => panic!("expected a format error for {:?}, got {:?}", input, other),
    }
}

#[test]
fn test_pension_returns_scenario() {
    let raw = vec![
        RawPoint::new("Mar.2023", "-10.9709"),
        RawPoint::new("Abr.2023", "-8.1139"),
        RawPoint::new("May.2023", "-6.0815"),
    ];

    let dataset = normalizer()
        .normalize("AFP", &raw, DateGrammar::Monthly, true)
        .unwrap();

    assert_eq!(
        dataset.timestamps(),
        vec![date(2023, 3, 1), date(2023, 4, 1), date(2023, 5, 1)]
    );
    assert_eq!(dataset.values(), vec![-0.109709, -0.081139, -0.060815]);
}

#[test]
fn test_exchange_rate_scenario() {
    let raw = vec![
        RawPoint::new("05.Mar.25", "3.563"),
        RawPoint::new("06.Mar.25", "3.5635"),
        RawPoint::new("07.Mar.25", "3.6"),
    ];

    let dataset = normalizer()
        .normalize("TC", &raw, DateGrammar::Daily, false)
        .unwrap();

    assert_eq!(
        dataset.timestamps(),
        vec![date(2025, 3, 5), date(2025, 3, 6), date(2025, 3, 7)]
    );
    assert_eq!(dataset.values(), vec![3.563, 3.5635, 3.6]);
}

#[test]
fn test_non_numeric_value_rejects_dataset() {
    let raw = vec![
        RawPoint::new("Mar.2023", "1.0"),
        RawPoint::new("Abr.2023", "n.d."),
    ];

    let err = normalizer()
        .normalize("AFP", &raw, DateGrammar::Monthly, true)
        .unwrap_err();
    assert!(matches!(err, ForecastError::ValidationError(ref msg) if msg.contains("n.d.")));
}

#[test]
fn test_renormalize_is_noop() {
    let raw = vec![
        RawPoint::new("Mar.2023", "-10.9709"),
        RawPoint::new("Abr.2023", "-8.1139"),
        RawPoint::new("May.2023", "-6.0815"),
    ];
    let n = normalizer();
    let once = n.normalize("AFP", &raw, DateGrammar::Monthly, true).unwrap();
    let twice = n.renormalize(&once).unwrap();

    assert_eq!(twice, once);
}

#[rstest]
#[case("12.3456789", false, 12.345679)]
#[case("  7 ", false, 7.0)]
#[case("50", true, 0.5)]
#[case("-0.0001", true, -0.000001)]
fn test_value_scaling(#[case] raw: &str, #[case] percent: bool, #[case] expected: f64) {
    assert_eq!(normalize_value(raw, percent), expected);
}

#[test]
fn test_custom_month_table() {
    let config = forecast_pipeline::PipelineConfig::from_toml_str(
        r#"
        [months]
        ENE = "Jan"
        FEB = "Feb"
        MAR = "Mar"
        ABR = "Apr"
        MAY = "May"
        JUN = "Jun"
        JUL = "Jul"
        AGO = "Aug"
        SET = "Sep"
        OCT = "Oct"
        NOV = "Nov"
        DIC = "Dec"
        "#,
    )
    .unwrap();

    let n = DateNormalizer::from_config(&config);
    assert_eq!(n.parse_monthly("Set.2024").unwrap(), date(2024, 9, 1));
}
