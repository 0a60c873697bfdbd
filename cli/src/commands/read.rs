// Copyright 2025 The Lakota Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Result;
use clap::Args;
use lakota_lib::array::parse_timestamp;
use lakota_lib::array::Array;
use lakota_lib::frame::Frame;
use lakota_lib::repo::Repo;

use crate::commands::get_series;

#[derive(Args)]
pub struct ReadArgs {
    /// `collection/series`.
    pub label: String,

    /// Columns to print (all by default).
    pub columns: Vec<String>,

    /// Lower index bound, one value per index column.
    #[arg(long = "gt", num_args = 1..)]
    pub greater_than: Vec<String>,

    /// Upper index bound (excluded), one value per index column.
    #[arg(long = "lt", num_args = 1..)]
    pub less_than: Vec<String>,

    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long)]
    pub offset: Option<usize>,

    /// Print in pages of N rows instead of one frame.
    #[arg(long)]
    pub paginate: Option<usize>,

    /// Only read commits at or after this time.
    #[arg(long)]
    pub after: Option<String>,

    /// Only read commits strictly before this time.
    #[arg(long)]
    pub before: Option<String>,

    /// Row filter of the form `column OP literal` (OP one of == != < <= > >=).
    #[arg(long)]
    pub mask: Option<String>,
}

pub fn run(repo: &Repo, args: &ReadArgs) -> Result<()> {
    let series = get_series(repo, &args.label)?;
    let schema = series.schema().clone();
    let columns: Vec<String> = if args.columns.is_empty() {
        schema.columns().iter().map(|col| col.name().to_string()).collect()
    } else {
        args.columns.clone()
    };

    let mut query = series.query().select(columns.clone());
    if !args.greater_than.is_empty() {
        query = query.start(schema.parse_bound(&args.greater_than)?);
    }
    if !args.less_than.is_empty() {
        query = query.stop(schema.parse_bound(&args.less_than)?);
    }
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }
    if let Some(offset) = args.offset {
        query = query.offset(offset);
    }
    if let Some(after) = &args.after {
        query = query.after(parse_timestamp(after)? as u64 * 1000);
    }
    if let Some(before) = &args.before {
        query = query.before(parse_timestamp(before)? as u64 * 1000);
    }

    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer.write_record(&columns)?;
    match args.paginate {
        Some(step) => {
            for frame in query.paginate(step)? {
                print_frame(&mut writer, &frame?, &columns, args.mask.as_deref())?;
            }
        }
        None => print_frame(&mut writer, &query.frame()?, &columns, args.mask.as_deref())?,
    }
    writer.flush()?;
    Ok(())
}

fn print_frame(
    writer: &mut csv::Writer<std::io::Stdout>,
    frame: &Frame,
    columns: &[String],
    mask: Option<&str>,
) -> Result<()> {
    let frame = match mask {
        Some(expr) => frame.mask(&eval_mask(frame, expr)?)?,
        None => frame.clone(),
    };
    for pos in 0..frame.len() {
        let record: Vec<String> = columns
            .iter()
            .map(|name| {
                frame
                    .column(name)
                    .map(|arr| arr.value(pos).render())
                    .unwrap_or_default()
            })
            .collect();
        writer.write_record(&record)?;
    }
    Ok(())
}

/// Evaluates a `column OP literal` comparison over a frame.
fn eval_mask(frame: &Frame, expr: &str) -> Result<Vec<bool>> {
    let tokens: Vec<&str> = expr.split_whitespace().collect();
    let [column, op, literal] = tokens[..] else {
        bail!("mask should have the form `column OP literal`, got `{expr}`");
    };
    let arr = frame
        .column(column)
        .ok_or_else(|| anyhow!("unknown mask column `{column}`"))?;
    let wanted = frame
        .schema()
        .column(column)
        .ok_or_else(|| anyhow!("unknown mask column `{column}`"))?
        .parse_value(literal)?;
    let matches = |arr: &Array, pos: usize| {
        let ord = arr.value(pos).cmp(&wanted);
        match op {
            "==" => ord.is_eq(),
            "!=" => ord.is_ne(),
            "<" => ord.is_lt(),
            "<=" => ord.is_le(),
            ">" => ord.is_gt(),
            ">=" => ord.is_ge(),
            _ => false,
        }
    };
    if !["==", "!=", "<", "<=", ">", ">="].contains(&op) {
        bail!("unknown mask operator `{op}`");
    }
    Ok((0..frame.len()).map(|pos| matches(arr, pos)).collect())
}

#[cfg(test)]
mod tests {
    use lakota_lib::schema::Schema;

    use super::*;

    #[test]
    fn test_eval_mask() {
        let schema = Schema::from_specs(&["k int*", "v float"]).unwrap();
        let frame = Frame::new(
            schema,
            vec![Array::Int(vec![1, 2, 3]), Array::Float(vec![1.0, 2.0, 3.0])],
        )
        .unwrap();
        assert_eq!(eval_mask(&frame, "v >= 2").unwrap(), vec![false, true, true]);
        assert_eq!(eval_mask(&frame, "k == 1").unwrap(), vec![true, false, false]);
        assert!(eval_mask(&frame, "v ~ 2").is_err());
        assert!(eval_mask(&frame, "nope == 2").is_err());
    }
}
