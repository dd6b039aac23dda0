/*!

This is the long-form manual for `census_tables` and `saictab`.

## Input format

The input is the flat export of the economic census, one row per
(year, entity, municipality, economic activity), either as a CSV file
(`"provider": "csv"`) or as a worksheet of an Excel workbook
(`"provider": "excel"`). The first row is the header.

The identifying columns are, by default:

| column                | content                                               |
|-----------------------|-------------------------------------------------------|
| `Año Censal`          | census year, e.g. `2018`                              |
| `Entidad`             | entity, e.g. `00 Total Nacional` or `28 Tamaulipas`    |
| `Municipio`           | municipality, empty for the entity-level rows         |
| `Actividad económica` | the activity label, e.g. `Sector 11 Agricultura`      |

Every other column is a metric. Its code is the first word of the header:
`A111A Producción bruta total` is the metric `A111A`.

A record belongs to:
* the national level when the municipality is empty and the entity is the
  national entity,
* the state level when the municipality is empty and the entity is the state,
* the municipal level when the municipality is filled and the entity is the state.

Other records are ignored, as are the records of the years that are not selected.

## Cell values

The census does not publish the figures that would reveal an individual
business. These figures are replaced by a marker `C`, and when a sum includes
such figures, the published part is followed by the number of hidden
contributors:

```text
12.5          a plain value
C             one hidden contributor
3C            three hidden contributors
40 + 2C       40 published, and two hidden contributors
N/A           does not exist
```

Sums keep track of the hidden contributors: `10` and `5 + C` add up to
`15 + C`. Missing values are not zeros: a sum of missing values is missing.

Any other text is read as missing and counted in the run summary.

## Outputs

All the tables are CSV files whose first column is the activity and whose other
columns are named `<metric>_<year>`, sorted by metric, then by year. The last
row of every table is its total: `Total Nacional`, `Total Tamaulipas`,
`Total <region>`. When the input does not report a total, it is computed from
the rows whose label starts with `Sector `.

```text
<national>/<national>.csv                        all metrics
<national>/<metric>_<national>.csv               one metric
<state>/...                                      same for the state
<state>_Municipal/<municipality>.csv
<state>_Regional/<region>/<region>.csv
<state>_Regional/<region>/<metric>_<region>.csv
proportional_national_state/<metric>_proportional.csv
proportional_state_regions/<region>/<metric>_<region>_proportional.csv
proportional_region_weight/<region>/<metric>_<region>_weight.csv
run_summary.json
```

With `writePercentages`, every per-metric table of the national, state and
regional levels also comes with a `_percent.csv` version, in which each row is
a percentage of the total row.

The ratios are written with 6 decimals. A ratio is left empty when it cannot be
computed: the denominator is zero, or one of the two values does not exist.

The proportional weight of a region combines the national/state and
state/region ratios. By default they are multiplied, which gives the
national/region ratio. `"composeMode": "quotient"` divides them instead.
The weights are computed from the ratios at full precision, so a share written
as `0` may still give a defined weight.

## Configuration

`saictab` reads a JSON configuration file:

```json
{
  "outputSettings": {
    "outputDirectory": "out",
    "writePercentages": true,
    "clearOutput": false
  },
  "inputSource": {
    "provider": "csv",
    "filePath": "saic.csv"
  },
  "geography": {
    "nationalEntity": "00 Total Nacional",
    "stateEntity": "28 Tamaulipas",
    "regions": [
      { "name": "Centro", "municipalities": ["041 Victoria", "017 Jaumave"] }
    ]
  },
  "periods": { "years": [2013, 2018], "minimumYear": 2013 },
  "rules": { "ratioDirection": "upperOverLower", "composeMode": "product" }
}
```

Notes:
- a municipality may only belong to one region;
- municipalities of the state that no region covers are reported as warnings;
- a region without any record is skipped, and listed in the run summary;
- the column names of the input can be changed in `inputSource`
  (`yearColumn`, `entityColumn`, `municipalityColumn`, `activityColumn`),
  and `excelWorksheetName` selects a worksheet.

The command line options `--input`, `--out` and `--clear` take precedence over
the configuration file. With `--reference <dir>`, every output is compared to the
file at the same place in `<dir>`, and the run fails if any of them differs.

 */
