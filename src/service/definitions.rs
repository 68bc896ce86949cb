use tracing::instrument;

use crate::model::apperror::ApplicationError;
use crate::model::climate::Dataset;
use crate::model::reports::ReportType;
use crate::pipeline::{Accumulator, Document, Expression, Pipeline, SortDirection};

/**
 * Year the single-year reports look at.
 */
pub const REFERENCE_YEAR: i64 = 2019;

pub const TOP_TEMPERATURE_CHANGE_LIMIT: usize = 10;

pub const TOP_ENERGY_DIVERSITY_LIMIT: usize = 5;

/**
 * Stored temperature change values are scaled by this factor.
 */
pub const TEMPERATURE_SCALE: f64 = 100.0;

/**
 * Runs the fixed pipeline of a report over the dataset.
 *
 * # Arguments
 * `report_type`: The report to produce.
 * `dataset`: The collections the report reads.
 *
 * # Returns
 * The ordered report rows, or the error of the first failing operator.
 */
#[instrument(level = "debug", skip(dataset), fields(countries = dataset.countries.len(), groups = dataset.groups.len()))]
pub fn assemble(report_type: ReportType, dataset: &Dataset) -> Result<Vec<Document>, ApplicationError> {
    match report_type {
        ReportType::RenewableShareByGroup => renewable_share_by_group(dataset),
        ReportType::TopTemperatureChange => top_temperature_change(dataset),
        ReportType::EnergyDiversityByGroup => energy_diversity_by_group(dataset),
        ReportType::CountrySummary => country_summary(dataset),
    }
}

/**
 * Renewable percentage per member country of every group, for the first year seen per country.
 * Rows: `{grupo, paises: [{nome, porcentagem, ano}]}` sorted by group name.
 */
pub fn renewable_share_by_group(dataset: &Dataset) -> Result<Vec<Document>, ApplicationError> {
    Pipeline::new()
        .lookup(dataset.country_documents()?, "countries", "code", "member")
        .unwind("member")
        .unwind("member.years")
        .unwind("member.years.energy_types")
        .group(
            Expression::object([("group", field("name")), ("country", field("member.name")), ("year", field("member.years.year"))]),
            [("total", Accumulator::Sum(field("member.years.energy_types.generation_value"))), ("renewable", Accumulator::Sum(renewable_generation("member.years.energy_types")))],
        )
        .add_fields([("percentage", guarded_percentage("renewable", "total"))])
        .group(
            Expression::object([("group", field("_id.group")), ("country", field("_id.country"))]),
            [("percentage", Accumulator::First(field("percentage"))), ("year", Accumulator::First(field("_id.year")))],
        )
        .group(
            field("_id.group"),
            [("paises", Accumulator::Push(Expression::object([("nome", field("_id.country")), ("porcentagem", Expression::rounded(field("percentage"), 2)), ("ano", field("year"))])))],
        )
        .sort("_id", SortDirection::Ascending)
        .project([("grupo", field("_id")), ("paises", field("paises"))])
        .execute(dataset.group_documents()?)
}

/**
 * Countries with the largest summed monthly temperature change in the reference year.
 * Rows: `{pais, codigo, ano, mudanca_temp, unidade}`.
 */
pub fn top_temperature_change(dataset: &Dataset) -> Result<Vec<Document>, ApplicationError> {
    Pipeline::new()
        .unwind("years")
        .filter(Expression::eq(field("years.year"), Expression::literal(REFERENCE_YEAR)))
        .unwind("years.months")
        .filter(Expression::exists("years.months.temperature_change"))
        .group(
            Expression::object([("pais", field("name")), ("codigo", field("code"))]),
            [("mudanca_temp", Accumulator::Sum(field("years.months.temperature_change"))), ("unidade", Accumulator::First(field("years.months.unit")))],
        )
        .sort("mudanca_temp", SortDirection::Descending)
        .limit(TOP_TEMPERATURE_CHANGE_LIMIT)
        .project([
            ("pais", field("_id.pais")),
            ("codigo", field("_id.codigo")),
            ("ano", Expression::literal(REFERENCE_YEAR)),
            ("mudanca_temp", Expression::divide(field("mudanca_temp"), Expression::literal(TEMPERATURE_SCALE))),
            ("unidade", field("unidade")),
        ])
        .execute(dataset.country_documents()?)
}

/**
 * Groups with the most distinct energy types in the reference year.
 * Rows: `{grupo, codigo, tipos_energia, quantidade_tipos}`.
 */
pub fn energy_diversity_by_group(dataset: &Dataset) -> Result<Vec<Document>, ApplicationError> {
    Pipeline::new()
        .unwind("years")
        .filter(Expression::eq(field("years.year"), Expression::literal(REFERENCE_YEAR)))
        .unwind("years.energy_types")
        .group(Expression::object([("grupo", field("name")), ("codigo", field("code"))]), [("tipos_energia", Accumulator::AddToSet(field("years.energy_types.type")))])
        .project([
            ("grupo", field("_id.grupo")),
            ("codigo", field("_id.codigo")),
            ("tipos_energia", field("tipos_energia")),
            ("quantidade_tipos", Expression::size(field("tipos_energia"))),
        ])
        .sort("quantidade_tipos", SortDirection::Descending)
        .limit(TOP_ENERGY_DIVERSITY_LIMIT)
        .execute(dataset.group_documents()?)
}

/**
 * Generation totals, renewable share and mean temperature change per country, largest producers first.
 * Rows: `{pais, total_geracao, energia_renovavel, porcentagem, unidade_geracao, media_mudanca_temp, unidade_temp}`.
 *
 * Energy and temperature are reduced separately and joined by country, so the number of
 * months never multiplies the generation totals.
 */
pub fn country_summary(dataset: &Dataset) -> Result<Vec<Document>, ApplicationError> {
    let countries = dataset.country_documents()?;
    let climate = Pipeline::new()
        .unwind("years")
        .unwind("years.months")
        .group(
            Expression::object([("pais", field("name"))]),
            [("media_mudanca_temp", Accumulator::Avg(field("years.months.temperature_change"))), ("unidade_temp", Accumulator::First(field("years.months.unit")))],
        )
        .project([("pais", field("_id.pais")), ("media_mudanca_temp", field("media_mudanca_temp")), ("unidade_temp", field("unidade_temp"))])
        .execute(countries.clone())?;
    Pipeline::new()
        .unwind("years")
        .unwind("years.energy_types")
        .group(
            Expression::object([("pais", field("name"))]),
            [
                ("total_geracao", Accumulator::Sum(field("years.energy_types.generation_value"))),
                ("energia_renovavel", Accumulator::Sum(renewable_generation("years.energy_types"))),
                ("unidade_geracao", Accumulator::First(field("years.energy_types.generation_unit"))),
            ],
        )
        .sort("total_geracao", SortDirection::Descending)
        .lookup(climate, "_id.pais", "pais", "clima")
        .project([
            ("pais", field("_id.pais")),
            ("total_geracao", field("total_geracao")),
            ("energia_renovavel", field("energia_renovavel")),
            ("porcentagem", guarded_percentage("energia_renovavel", "total_geracao")),
            ("unidade_geracao", field("unidade_geracao")),
            // Countries without temperature data have no climate row: index 0 resolves to null.
            ("media_mudanca_temp", field("clima.0.media_mudanca_temp")),
            ("unidade_temp", field("clima.0.unidade_temp")),
        ])
        .execute(countries)
}

fn field(path: &str) -> Expression {
    Expression::field(path)
}

/**
 * Generation value of a renewable energy entry, zero otherwise.
 */
fn renewable_generation(energy_path: &str) -> Expression {
    Expression::cond(
        Expression::eq(field(&format!("{energy_path}.is_renewable")), Expression::literal(true)),
        field(&format!("{energy_path}.generation_value")),
        Expression::literal(0.0),
    )
}

/**
 * `part / total * 100`, or 0 when total is not positive.
 */
fn guarded_percentage(part: &str, total: &str) -> Expression {
    Expression::cond(
        Expression::gt(field(total), Expression::literal(0)),
        Expression::multiply([Expression::divide(field(part), field(total)), Expression::literal(100)]),
        Expression::literal(0.0),
    )
}
