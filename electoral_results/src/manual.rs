/*!

This is the long-form manual for `electoral_results` and `seccionales`.

## Input formats

Each electoral source is a table with one row per party and seccional. The
following providers are supported:
* `excel` any spreadsheet format (`.xls`, `.xlsx`, `.ods`)
* `csv` the same table exported as Comma Separated Values

### Columns

The first row is the header. Headers are matched case-insensitively and the
known spellings are folded onto a canonical name:

| canonical    | accepted headers                      | required |
|--------------|---------------------------------------|----------|
| `anio`       | `año`, `anio`, `year`                 | no       |
| `cargo`      | `cargo`                               | no       |
| `seccional`  | `seccional`                           | yes      |
| `agrupacion` | `agrupacion`, `agrupación`, `partido` | yes      |
| `votos`      | `votos`, `diputados`, `sum_diputados` | yes      |

Exports sometimes mangle the `ñ` of `año`: any three-letter header that starts
with `a` and ends with `o` is read as `anio`. When the year or the office is
missing, the values of the configuration are used.

```text
año,cargo,seccional,agrupacion,diputados
2021,Diputados,Seccional 1,HACEMOS UNIDOS POR CORDOBA,600
2021,Diputados,Seccional 1,JUNTOS POR EL CAMBIO,300
2021,Diputados,Total,,900
```

A source that lacks a required column is skipped with a warning.

### Boundaries

The circuits are read from a GeoJSON FeatureCollection of `Polygon` or
`MultiPolygon` features. The property named by `seccionalProperty` (string or
number) tells which seccional the circuit belongs to.

## Mappings

Three JSON objects drive the normalization:

- `seccionalNames`: raw label to seccional number, for example
  `{"Seccional 1": "1", "SECCIONAL 1": "1", "Total": null}`. A `null` value
  drops the rows with that label. A label that is already one of the numbers
  of the table (`"1"`) is accepted as it is. Any other label is dropped.
- `partyNormalization`: raw party name to canonical name. Names without an
  entry are kept unchanged and listed in the run summary.
- `partyColors`: canonical party name to a color (`#808080` when missing).

Every dropped row is logged and counted in the summary with its reason:
`excludedSeccional`, `unknownSeccional`, `missingSeccional`, `missingParty`,
`missingVotes`, `invalidVotes`, `invalidYear`.

Rows that fall on the same year, seccional and party are added up. They must
agree on the office.

## Outputs

- the clean CSV, with the columns
  `anio,cargo,seccional,agrupacion,votos,total_votos,porcentaje`
- one GeoJSON feature per seccional, with the properties `seccional`,
  `seccional_num`, `nombre`, `circuitos`, `lat`, `lon` and `area_km2`
- an SQLite database with the tables `seccionales`, `agrupaciones` and
  `resultados` and the view `ganadores`. The database is rebuilt from scratch
  on every run.
- a JSON summary of the run. Passing `--reference` compares it to a previous
  summary and fails on any difference.

 */
