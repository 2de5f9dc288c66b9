use crate::buckets::{age_distribution, daily_buckets, monthly_trend, weekly_comparison};
use crate::dataset::Dataset;
use crate::period::Period;
use crate::visitor::AgeBracket;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::series::AreaSeries;
use plotters::style::RGBAColor;
use serde::Deserialize;
use std::error::Error;
use std::str::FromStr;

/// Report charts that can be rendered to PNG
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    /// Visitors per day of the month, with the "new" sub-count as a second line
    Daily,

    /// Visitors per week, current month next to the previous one
    Weekly,

    /// Visitors per month of the selected year
    Monthly,

    /// Visitors per age bracket
    Age,
}

impl FromStr for ChartKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(ChartKind::Daily),
            "weekly" => Ok(ChartKind::Weekly),
            "monthly" => Ok(ChartKind::Monthly),
            "age" => Ok(ChartKind::Age),
            other => Err(format!("Unknown chart kind: {other}")),
        }
    }
}

/// Configuration options for chart rendering
#[derive(Clone, Debug)]
pub struct ChartOptions {
    /// Title displayed at the top; empty picks one from the chart kind
    pub title: String,

    /// Width of the image in pixels
    pub width: u32,

    /// Height of the image in pixels
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            width: 800,
            height: 600,
        }
    }
}

/// Named value series sharing one set of category labels.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartSeries {
    pub title: String,
    pub x_label: &'static str,
    pub labels: Vec<String>,
    pub series: Vec<(&'static str, Vec<usize>)>,
}

impl ChartSeries {
    fn max_value(&self) -> usize {
        self.series
            .iter()
            .flat_map(|(_, values)| values.iter().copied())
            .max()
            .unwrap_or(0)
    }
}

/// Collects the values a chart plots, without drawing anything.
pub fn chart_series(kind: ChartKind, data: &Dataset<'_>, period: Period) -> ChartSeries {
    match kind {
        ChartKind::Daily => {
            let daily = daily_buckets(data, period);
            ChartSeries {
                title: format!("Visitantes por dia - {}", period.label()),
                x_label: "Dia",
                labels: daily.iter().map(|b| b.day.to_string()).collect(),
                series: vec![
                    ("Visitantes", daily.iter().map(|b| b.visitors).collect()),
                    ("Novos", daily.iter().map(|b| b.new_visitors).collect()),
                ],
            }
        }
        ChartKind::Weekly => {
            let weeks = weekly_comparison(data, period);
            ChartSeries {
                title: format!("Comparativo semanal - {}", period.label()),
                x_label: "Semana",
                labels: weeks.iter().map(|w| w.label.clone()).collect(),
                series: vec![
                    ("Mês atual", weeks.iter().map(|w| w.current).collect()),
                    ("Mês anterior", weeks.iter().map(|w| w.previous).collect()),
                ],
            }
        }
        ChartKind::Monthly => {
            let months = monthly_trend(data, period.year);
            ChartSeries {
                title: format!("Tendência mensal - {}", period.year),
                x_label: "Mês",
                labels: months.iter().map(|m| m.label.to_string()).collect(),
                series: vec![("Visitantes", months.iter().map(|m| m.visitors).collect())],
            }
        }
        ChartKind::Age => {
            let slices = age_distribution(data.records());
            ChartSeries {
                title: "Faixa etária".to_string(),
                x_label: "Faixa",
                labels: slices.iter().map(|s| s.label.to_string()).collect(),
                series: vec![("Visitantes", slices.iter().map(|s| s.count).collect())],
            }
        }
    }
}

/// Renders a report chart as PNG bytes
///
/// # Arguments
/// * `kind` - Which chart to draw
/// * `data` - Record snapshot resolved to the local calendar
/// * `period` - Selected month (the monthly trend only uses its year)
/// * `options` - Size and title
///
/// # Returns
/// * A Result containing the PNG image data as bytes or an error
///
/// # Implementation Notes
/// * Draws into a temporary file that is removed once the bytes are read back
pub fn render_chart(
    kind: ChartKind,
    data: &Dataset<'_>,
    period: Period,
    options: &ChartOptions,
) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut chart = chart_series(kind, data, period);
    if !options.title.is_empty() {
        chart.title = options.title.clone();
    }

    let file = tempfile::Builder::new()
        .prefix("visitor-chart-")
        .suffix(".png")
        .tempfile()?;
    {
        let root =
            BitMapBackend::new(file.path(), (options.width, options.height)).into_drawing_area();
        root.fill(&WHITE)?;
        match kind {
            ChartKind::Daily => draw_lines(&root, &chart)?,
            ChartKind::Monthly => draw_area(&root, &chart)?,
            ChartKind::Weekly => {
                let colors = [BLUE.to_rgba(), RGBColor(160, 160, 160).to_rgba()];
                draw_bars(&root, &chart, &colors)?
            }
            ChartKind::Age => {
                let colors: Vec<RGBAColor> = AgeBracket::ALL
                    .iter()
                    .map(|b| {
                        let (r, g, bl) = b.color();
                        RGBColor(r, g, bl).to_rgba()
                    })
                    .collect();
                draw_category_bars(&root, &chart, &colors)?
            }
        }
        root.present()?;
    }

    Ok(std::fs::read(file.path())?)
}

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

fn label_at(labels: &[String], x: f64) -> String {
    labels.get(x.floor() as usize).cloned().unwrap_or_default()
}

/// Line per series over 1-based day labels.
fn draw_lines(root: &Area<'_>, chart_data: &ChartSeries) -> Result<(), Box<dyn Error>> {
    let points = chart_data.labels.len() as u32;
    let y_max = chart_data.max_value() as u32 + 1;

    let mut chart = ChartBuilder::on(root)
        .caption(&chart_data.title, ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(1u32..points + 1, 0u32..y_max)?;

    chart
        .configure_mesh()
        .x_desc(chart_data.x_label)
        .y_desc("Visitantes")
        .draw()?;

    let palette = [BLUE, GREEN];
    for ((name, values), color) in chart_data.series.iter().zip(palette) {
        chart
            .draw_series(LineSeries::new(
                values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i as u32 + 1, *v as u32)),
                &color,
            ))?
            .label(*name)
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], ShapeStyle::from(&color))
            });
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

/// Filled area of the first series.
fn draw_area(root: &Area<'_>, chart_data: &ChartSeries) -> Result<(), Box<dyn Error>> {
    let points = chart_data.labels.len() as f64;
    let y_max = chart_data.max_value() as f64 + 1.0;
    let labels = chart_data.labels.clone();

    let mut chart = ChartBuilder::on(root)
        .caption(&chart_data.title, ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(0.0..points, 0.0..y_max)?;

    chart
        .configure_mesh()
        .x_desc(chart_data.x_label)
        .y_desc("Visitantes")
        .x_labels(labels.len())
        .x_label_formatter(&|x| label_at(&labels, *x))
        .draw()?;

    if let Some((_, values)) = chart_data.series.first() {
        chart.draw_series(
            AreaSeries::new(
                values.iter().enumerate().map(|(i, v)| (i as f64, *v as f64)),
                0.0,
                BLUE.mix(0.2),
            )
            .border_style(BLUE),
        )?;
    }
    Ok(())
}

/// Side-by-side bars, one per series, for every category.
fn draw_bars(
    root: &Area<'_>,
    chart_data: &ChartSeries,
    colors: &[RGBAColor],
) -> Result<(), Box<dyn Error>> {
    let categories = chart_data.labels.len() as f64;
    let y_max = chart_data.max_value() as f64 + 1.0;
    let labels = chart_data.labels.clone();

    let mut chart = ChartBuilder::on(root)
        .caption(&chart_data.title, ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(0.0..categories, 0.0..y_max)?;

    chart
        .configure_mesh()
        .x_desc(chart_data.x_label)
        .y_desc("Visitantes")
        .x_labels(labels.len())
        .x_label_formatter(&|x| label_at(&labels, *x))
        .draw()?;

    let width = 0.8 / chart_data.series.len().max(1) as f64;
    for (s, ((name, values), color)) in chart_data.series.iter().zip(colors).enumerate() {
        let color = *color;
        let offset = 0.1 + s as f64 * width;
        chart
            .draw_series(values.iter().enumerate().map(move |(i, v)| {
                let x = i as f64 + offset;
                Rectangle::new([(x, 0.0), (x + width, *v as f64)], color.filled())
            }))?
            .label(*name)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

/// One bar per category of the first series, each with its own colour.
fn draw_category_bars(
    root: &Area<'_>,
    chart_data: &ChartSeries,
    colors: &[RGBAColor],
) -> Result<(), Box<dyn Error>> {
    let categories = chart_data.labels.len() as f64;
    let y_max = chart_data.max_value() as f64 + 1.0;
    let labels = chart_data.labels.clone();

    let mut chart = ChartBuilder::on(root)
        .caption(&chart_data.title, ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(0.0..categories, 0.0..y_max)?;

    chart
        .configure_mesh()
        .x_desc(chart_data.x_label)
        .y_desc("Visitantes")
        .x_labels(labels.len())
        .x_label_formatter(&|x| label_at(&labels, *x))
        .draw()?;

    if let Some((_, values)) = chart_data.series.first() {
        chart.draw_series(values.iter().enumerate().map(|(i, v)| {
            let color = colors.get(i).copied().unwrap_or(BLUE.to_rgba());
            Rectangle::new([(i as f64 + 0.15, 0.0), (i as f64 + 0.85, *v as f64)], color.filled())
        }))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{record, utc};

    #[test]
    fn chart_kind_parses_route_segment() {
        assert_eq!("daily".parse::<ChartKind>(), Ok(ChartKind::Daily));
        assert_eq!("age".parse::<ChartKind>(), Ok(ChartKind::Age));
        assert!("pie".parse::<ChartKind>().is_err());
    }

    #[test]
    fn daily_series_has_one_label_per_day() {
        let records = vec![
            record("a", "2024-02-10T10:00:00Z", 1),
            record("b", "2024-02-10T11:00:00Z", 1),
        ];
        let data = Dataset::new(&records, utc());
        let chart = chart_series(ChartKind::Daily, &data, Period::new(2024, 1).unwrap());
        assert_eq!(chart.labels.len(), 29);
        assert_eq!(chart.series.len(), 2);
        assert_eq!(chart.series[0].1[9], 2);
        assert_eq!(chart.series[1].1[9], 2);
        assert_eq!(chart.max_value(), 2);
        assert_eq!(chart.title, "Visitantes por dia - Fevereiro 2024");
    }

    #[test]
    fn age_series_follows_taxonomy_order() {
        let data = Dataset::new(&[], utc());
        let chart = chart_series(ChartKind::Age, &data, Period::new(2024, 1).unwrap());
        assert_eq!(
            chart.labels,
            ["Criança", "Adolescente", "Jovem", "Adulto", "Melhor idade"]
        );
        assert_eq!(chart.max_value(), 0);
    }
}
