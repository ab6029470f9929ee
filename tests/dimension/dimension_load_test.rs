use std::path::Path;

use lq_etl::config::DimensionSources;
use lq_etl::dimension::{CnaeRow, GeographyDimensions, MunicipioRow};
use lq_etl::utils::test::{
    sample_cnae_rows, sample_geography, write_cnae_dictionary, write_geography,
};
use lq_etl::{DimensionStore, LqError};
use tempfile::TempDir;

fn sources(dir: &Path, delimiter: char) -> DimensionSources {
    DimensionSources {
        dir: dir.to_path_buf(),
        cnae_dictionary: dir.join("dicionario_cnae_2.csv"),
        cnae_delimiter: delimiter,
        section_codes: None,
        first_year: 2007,
        last_year: 2029,
    }
}

fn section_of(store: &DimensionStore, classe: &str) -> i32 {
    store.industry.class(classe).unwrap().secao
}

#[test]
fn test_load_normalizes_dictionary_codes() -> lq_etl::Result<()> {
    let dir = TempDir::new()?;
    write_geography(dir.path(), &sample_geography())?;
    let sources = sources(dir.path(), ';');
    write_cnae_dictionary(&sources.cnae_dictionary, &sample_cnae_rows(), ';')?;

    let store = DimensionStore::load(&sources)?;

    assert_eq!(store.geography.ufs().len(), 2);
    assert_eq!(store.geography.municipios().len(), 4);
    assert!(store.geography.municipio("120002").is_some());

    // `01.00-0` with division `1` in the file
    let row = store.industry.class("01000").unwrap();
    assert_eq!(row.divisao, "01");
    assert_eq!(row.descricao_secao, "Agricultura");
    assert_eq!(row.descricao_divisao.as_deref(), Some("Divisao 01"));
    assert_eq!(store.industry.rows().len(), 3);
    Ok(())
}

#[test]
fn test_derived_section_codes_follow_sorted_descriptions() -> lq_etl::Result<()> {
    let dir = TempDir::new()?;
    write_geography(dir.path(), &sample_geography())?;
    let sources = sources(dir.path(), ';');

    // dictionary rows in reverse order must not change the codes
    let mut rows = sample_cnae_rows();
    rows.reverse();
    write_cnae_dictionary(&sources.cnae_dictionary, &rows, ';')?;

    let store = DimensionStore::load(&sources)?;
    assert_eq!(section_of(&store, "01000"), 1);
    assert_eq!(section_of(&store, "02000"), 2);
    assert_eq!(section_of(&store, "47000"), 3);
    Ok(())
}

#[test]
fn test_pinned_section_codes() -> lq_etl::Result<()> {
    let dir = TempDir::new()?;
    write_geography(dir.path(), &sample_geography())?;
    let mut sources = sources(dir.path(), ',');
    write_cnae_dictionary(&sources.cnae_dictionary, &sample_cnae_rows(), ',')?;

    let pinned = dir.path().join("section_codes.csv");
    std::fs::write(
        &pinned,
        "descricao_secao,secao\nIndustria,30\nComercio,20\nAgricultura,10\n",
    )?;
    sources.section_codes = Some(pinned);

    let store = DimensionStore::load(&sources)?;
    assert_eq!(section_of(&store, "01000"), 10);
    assert_eq!(section_of(&store, "02000"), 20);
    assert_eq!(section_of(&store, "47000"), 30);
    Ok(())
}

#[test]
fn test_pinned_codes_must_cover_every_section() -> lq_etl::Result<()> {
    let dir = TempDir::new()?;
    write_geography(dir.path(), &sample_geography())?;
    let mut sources = sources(dir.path(), ',');
    write_cnae_dictionary(&sources.cnae_dictionary, &sample_cnae_rows(), ',')?;

    let pinned = dir.path().join("section_codes.csv");
    std::fs::write(&pinned, "descricao_secao,secao\nAgricultura,1\n")?;
    sources.section_codes = Some(pinned);

    let err = DimensionStore::load(&sources).unwrap_err();
    assert!(matches!(err, LqError::DimensionLoad { .. }), "{err}");
    Ok(())
}

#[test]
fn test_missing_dimension_file_fails() -> lq_etl::Result<()> {
    let dir = TempDir::new()?;
    let sources = sources(dir.path(), ';');
    write_cnae_dictionary(&sources.cnae_dictionary, &sample_cnae_rows(), ';')?;

    let err = DimensionStore::load(&sources).unwrap_err();
    assert!(
        matches!(err, LqError::DimensionLoad { ref dimension, .. } if dimension == "dim_uf"),
        "{err}"
    );
    Ok(())
}

#[test]
fn test_missing_cnae_dictionary_fails() -> lq_etl::Result<()> {
    let dir = TempDir::new()?;
    write_geography(dir.path(), &sample_geography())?;

    let err = DimensionStore::load(&sources(dir.path(), ';')).unwrap_err();
    assert!(
        matches!(err, LqError::DimensionLoad { ref dimension, .. } if dimension == "dim_cnae"),
        "{err}"
    );
    Ok(())
}

#[test]
fn test_orphan_municipality_is_rejected() {
    let sample = sample_geography();
    let mut municipios = sample.municipios().to_vec();
    municipios.push(MunicipioRow {
        id_municipio: "130001".to_string(),
        nome: None,
        id_microrregiao: "13001".to_string(),
    });

    let err = GeographyDimensions::from_rows(
        sample.ufs().to_vec(),
        sample.mesorregioes().to_vec(),
        sample.microrregioes().to_vec(),
        municipios,
    )
    .unwrap_err();
    assert!(err.to_string().contains("13001"));
}

#[test]
fn test_duplicate_class_keeps_first_row() -> lq_etl::Result<()> {
    let dir = TempDir::new()?;
    write_geography(dir.path(), &sample_geography())?;
    let sources = sources(dir.path(), ';');

    let mut rows = sample_cnae_rows();
    rows.push(CnaeRow {
        classe: "01000".to_string(),
        divisao: "02".to_string(),
        descricao_divisao: None,
        secao: 2,
        descricao_secao: "Comercio".to_string(),
    });
    write_cnae_dictionary(&sources.cnae_dictionary, &rows, ';')?;

    let store = DimensionStore::load(&sources)?;
    assert_eq!(store.industry.rows().len(), 3);
    assert_eq!(store.industry.class("01000").unwrap().divisao, "01");
    Ok(())
}
