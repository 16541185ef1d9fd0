//! Графики отчёта (SVG в памяти, plotters)

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use super::metrics::{ConfusionMatrix, MetricReport};
use super::report::ReportStyle;
use crate::error::{Result, ThyroError};

type DrawResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// Готовый график: заголовок и SVG-документ
#[derive(Debug, Clone)]
pub struct Figure {
    pub title: String,
    pub svg: String,
}

/// "#rrggbb" -> RGBColor
pub fn parse_hex_color(hex: &str) -> Result<RGBColor> {
    let digits = hex.trim().trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
    };
    match (digits.len(), channel(0..2), channel(2..4), channel(4..6)) {
        (6, Some(r), Some(g), Some(b)) => Ok(RGBColor(r, g, b)),
        _ => Err(ThyroError::InvalidConfig(format!("invalid color '{}'", hex))),
    }
}

fn palette_color(style: &ReportStyle, index: usize) -> RGBColor {
    style
        .palette
        .get(index % style.palette.len().max(1))
        .and_then(|hex| parse_hex_color(hex).ok())
        .unwrap_or_else(|| {
            let (r, g, b) = Palette99::pick(index).rgb();
            RGBColor(r, g, b)
        })
}

fn class_color(style: &ReportStyle, class: usize) -> RGBColor {
    style
        .class_colors
        .get(class)
        .and_then(|hex| parse_hex_color(hex).ok())
        .unwrap_or(if class == 0 { BLUE } else { RED })
}

fn lerp(a: u8, b: u8, t: f64) -> u8 {
    (a as f64 + (b as f64 - a as f64) * t.clamp(0.0, 1.0)).round() as u8
}

/// Светло-голубой -> тёмно-синий, t в [0, 1]
fn blues(t: f64) -> RGBColor {
    RGBColor(lerp(247, 8, t), lerp(251, 48, t), lerp(255, 107, t))
}

/// Синий (-1) -> белый (0) -> красный (1); NaN - серый
fn coolwarm(r: f64) -> RGBColor {
    if r.is_nan() {
        return RGBColor(200, 200, 200);
    }
    if r < 0.0 {
        let t = -r;
        RGBColor(lerp(247, 59, t), lerp(247, 76, t), lerp(247, 192, t))
    } else {
        RGBColor(lerp(247, 180, r), lerp(247, 4, r), lerp(247, 38, r))
    }
}

fn render<F>(style: &ReportStyle, title: &str, draw: F) -> Result<Figure>
where
    F: FnOnce(&DrawingArea<SVGBackend<'_>, Shift>) -> DrawResult,
{
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (style.width, style.height)).into_drawing_area();
        root.fill(&WHITE)
            .map_err(|e| ThyroError::Render(e.to_string()))?;
        draw(&root).map_err(|e| ThyroError::Render(format!("{}: {}", title, e)))?;
        root.present()
            .map_err(|e| ThyroError::Render(e.to_string()))?;
    }

    Ok(Figure {
        title: title.to_string(),
        svg,
    })
}

fn value_label_style(size: u32) -> TextStyle<'static> {
    ("sans-serif", size)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Bottom))
}

/// Столбцы по классам с подписями количества
pub fn class_distribution_bar(style: &ReportStyle, counts: [usize; 2]) -> Result<Figure> {
    let title = "Original Class Distribution";
    let labels = ["Normal (0)", "Anomaly (1)"];
    let y_max = (counts.iter().copied().max().unwrap_or(1) as f64 * 1.15).max(1.0);

    render(style, title, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, ("sans-serif", 20).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d((0usize..2).into_segmented(), 0f64..y_max)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_desc("Class Label")
            .y_desc("Count")
            .x_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => {
                    labels.get(*i).map(|s| s.to_string()).unwrap_or_default()
                }
                SegmentValue::Last => String::new(),
            })
            .draw()?;

        chart.draw_series(counts.iter().enumerate().map(|(i, &count)| {
            Rectangle::new(
                [
                    (SegmentValue::Exact(i), 0.0),
                    (SegmentValue::Exact(i + 1), count as f64),
                ],
                class_color(style, i).mix(0.8).filled(),
            )
        }))?;

        chart.draw_series(counts.iter().enumerate().map(|(i, &count)| {
            Text::new(
                count.to_string(),
                (SegmentValue::CenterOf(i), count as f64),
                value_label_style(14),
            )
        }))?;
        Ok(())
    })
}

/// Круговая диаграмма долей классов
pub fn class_distribution_pie(style: &ReportStyle, counts: [usize; 2]) -> Result<Figure> {
    let title = "Class Distribution (Percentage)";
    let sizes: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
    let colors = [class_color(style, 0), class_color(style, 1)];
    let labels = ["Normal (0)", "Anomaly (1)"];

    render(style, title, |root| {
        let area = root.titled(title, ("sans-serif", 20).into_font())?;
        let (width, height) = area.dim_in_pixel();
        let center = (width as i32 / 2, height as i32 / 2);
        let radius = (width.min(height) as f64) * 0.35;

        let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
        pie.label_style(("sans-serif", 16).into_font().color(&BLACK));
        pie.percentages(("sans-serif", 14).into_font().color(&WHITE));
        area.draw(&pie)?;
        Ok(())
    })
}

/// Сравнение ROC-AUC моделей
pub fn roc_auc_comparison(style: &ReportStyle, reports: &[MetricReport]) -> Result<Figure> {
    let title = "ROC-AUC Score Comparison";
    let names: Vec<String> = reports.iter().map(|r| r.model.clone()).collect();
    let n = reports.len().max(1);

    render(style, title, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, ("sans-serif", 20).into_font())
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(50)
            .build_cartesian_2d((0usize..n).into_segmented(), 0f64..1.1f64)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_desc("Models")
            .y_desc("ROC-AUC")
            .x_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => {
                    names.get(*i).cloned().unwrap_or_default()
                }
                SegmentValue::Last => String::new(),
            })
            .draw()?;

        chart.draw_series(reports.iter().enumerate().map(|(i, report)| {
            Rectangle::new(
                [
                    (SegmentValue::Exact(i), 0.0),
                    (SegmentValue::Exact(i + 1), report.roc_auc),
                ],
                palette_color(style, i).mix(0.8).filled(),
            )
        }))?;

        chart.draw_series(reports.iter().enumerate().map(|(i, report)| {
            Text::new(
                format!("{:.3}", report.roc_auc),
                (SegmentValue::CenterOf(i), report.roc_auc + 0.01),
                value_label_style(13),
            )
        }))?;
        Ok(())
    })
}

/// Важность признаков Random Forest, самые важные сверху
pub fn feature_importance(
    style: &ReportStyle,
    names: &[String],
    importances: &[f64],
) -> Result<Figure> {
    let title = "Feature Importance (Random Forest)";

    let mut order: Vec<usize> = (0..importances.len().min(names.len())).collect();
    order.sort_by(|&a, &b| {
        importances[b]
            .partial_cmp(&importances[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    // Нижний сегмент оси Y - наименее важный признак
    order.reverse();

    let n = order.len().max(1);
    let x_max = importances
        .iter()
        .copied()
        .fold(0.0f64, f64::max)
        .max(1e-9)
        * 1.1;
    let color = class_color(style, 0);

    render(style, title, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, ("sans-serif", 20).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(160)
            .build_cartesian_2d(0f64..x_max, (0usize..n).into_segmented())?;

        chart
            .configure_mesh()
            .disable_y_mesh()
            .x_desc("Importance")
            .y_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => order
                    .get(*i)
                    .and_then(|&feature| names.get(feature))
                    .cloned()
                    .unwrap_or_default(),
                SegmentValue::Last => String::new(),
            })
            .draw()?;

        chart.draw_series(order.iter().enumerate().map(|(row, &feature)| {
            Rectangle::new(
                [
                    (0.0, SegmentValue::Exact(row)),
                    (importances[feature], SegmentValue::Exact(row + 1)),
                ],
                color.mix(0.8).filled(),
            )
        }))?;
        Ok(())
    })
}

/// Тепловая карта матрицы ошибок 2x2
pub fn confusion_heatmap(
    style: &ReportStyle,
    title: &str,
    matrix: &ConfusionMatrix,
) -> Result<Figure> {
    let cells = matrix.as_array();
    let max = cells.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;
    let axis_labels = ["0", "1"];

    render(style, title, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, ("sans-serif", 20).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d((0usize..2).into_segmented(), (0usize..2).into_segmented())?;

        // Строка 0 (истинная норма) сверху, как у imshow
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Predicted Label")
            .y_desc("True Label")
            .x_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) => axis_labels.get(*i).map(|s| s.to_string()).unwrap_or_default(),
                _ => String::new(),
            })
            .y_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) => axis_labels
                    .get(1 - (*i).min(1))
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                _ => String::new(),
            })
            .draw()?;

        let positions = [(0usize, 0usize), (0, 1), (1, 0), (1, 1)];
        chart.draw_series(positions.iter().map(|&(row, column)| {
            let y = 1 - row;
            Rectangle::new(
                [
                    (SegmentValue::Exact(column), SegmentValue::Exact(y)),
                    (SegmentValue::Exact(column + 1), SegmentValue::Exact(y + 1)),
                ],
                blues(cells[row][column] as f64 / max).filled(),
            )
        }))?;

        chart.draw_series(positions.iter().map(|&(row, column)| {
            let value = cells[row][column];
            let text_color = if value as f64 > max / 2.0 { WHITE } else { BLACK };
            Text::new(
                value.to_string(),
                (SegmentValue::CenterOf(column), SegmentValue::CenterOf(1 - row)),
                ("sans-serif", 22)
                    .into_font()
                    .color(&text_color)
                    .pos(Pos::new(HPos::Center, VPos::Center)),
            )
        }))?;
        Ok(())
    })
}

/// ROC-кривые всех моделей с диагональю случайного классификатора
pub fn roc_curves(style: &ReportStyle, reports: &[MetricReport]) -> Result<Figure> {
    let title = "ROC Curves - All Models";

    render(style, title, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, ("sans-serif", 20).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(0f64..1f64, 0f64..1f64)?;

        chart
            .configure_mesh()
            .x_desc("False Positive Rate")
            .y_desc("True Positive Rate")
            .draw()?;

        for (i, report) in reports.iter().enumerate() {
            let color = palette_color(style, i);
            let points: Vec<(f64, f64)> = report
                .roc
                .fpr
                .iter()
                .copied()
                .zip(report.roc.tpr.iter().copied())
                .collect();
            chart
                .draw_series(LineSeries::new(points, color.stroke_width(2)))?
                .label(format!("{} (AUC: {:.3})", report.model, report.roc_auc))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }

        chart.draw_series(LineSeries::new(
            vec![(0.0, 0.0), (1.0, 1.0)],
            BLACK.mix(0.5),
        ))?;

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        Ok(())
    })
}

/// Тепловая карта корреляций признаков
pub fn correlation_heatmap(
    style: &ReportStyle,
    names: &[String],
    correlation: &[Vec<f64>],
) -> Result<Figure> {
    let title = "Feature Correlation Matrix";
    let n = names.len().min(correlation.len()).max(1);

    render(style, title, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, ("sans-serif", 20).into_font())
            .margin(10)
            .x_label_area_size(60)
            .y_label_area_size(160)
            .build_cartesian_2d((0usize..n).into_segmented(), (0usize..n).into_segmented())?;

        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(n)
            .y_labels(n)
            .x_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) => names.get(*i).cloned().unwrap_or_default(),
                _ => String::new(),
            })
            .y_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) if *i < n => {
                    names.get(n - 1 - *i).cloned().unwrap_or_default()
                }
                _ => String::new(),
            })
            .draw()?;

        let cells = (0..n).flat_map(|row| (0..n).map(move |column| (row, column)));
        chart.draw_series(cells.map(|(row, column)| {
            let r = correlation
                .get(row)
                .and_then(|values| values.get(column))
                .copied()
                .unwrap_or(f64::NAN);
            let y = n - 1 - row;
            Rectangle::new(
                [
                    (SegmentValue::Exact(column), SegmentValue::Exact(y)),
                    (SegmentValue::Exact(column + 1), SegmentValue::Exact(y + 1)),
                ],
                coolwarm(r).filled(),
            )
        }))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse() {
        assert_eq!(parse_hex_color("#e74c3c").unwrap(), RGBColor(0xe7, 0x4c, 0x3c));
        assert_eq!(parse_hex_color("3498db").unwrap(), RGBColor(0x34, 0x98, 0xdb));
        assert!(parse_hex_color("#12345").is_err());
        assert!(parse_hex_color("#zzzzzz").is_err());
    }

    #[test]
    fn class_bar_renders_svg() {
        let figure = class_distribution_bar(&ReportStyle::default(), [930, 70]).unwrap();
        assert!(figure.svg.contains("<svg"));
        assert!(figure.svg.contains("930"));
    }

    #[test]
    fn correlation_heatmap_handles_nan() {
        let names = vec!["a".to_string(), "b".to_string()];
        let matrix = vec![vec![1.0, f64::NAN], vec![f64::NAN, 1.0]];
        let figure = correlation_heatmap(&ReportStyle::default(), &names, &matrix).unwrap();
        assert!(figure.svg.contains("</svg>"));
    }

    #[test]
    fn color_maps_hit_their_ends() {
        assert_eq!(blues(0.0), RGBColor(247, 251, 255));
        assert_eq!(blues(1.0), RGBColor(8, 48, 107));
        assert_eq!(coolwarm(0.0), RGBColor(247, 247, 247));
        assert_eq!(coolwarm(f64::NAN), RGBColor(200, 200, 200));
    }
}
