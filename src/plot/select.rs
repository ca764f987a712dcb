use super::{Plot, PlotBackend, PlotFamily, ScatterSpec, TimeSeriesInput};
use crate::core::model::{Dataset, LengthColumn};
use crate::core::settings::{Settings, UnitContext};
use crate::core::stats;
use anyhow::Result;
use log::{debug, info};

/// Decides which plots the dataset supports and renders them in a fixed order.
///
/// Column presence is read once from the dataset schema. Length-dependent
/// plots use the rows passing `length_filter`; channel, mapping-quality and
/// identity-vs-quality plots use every row.
pub fn select<B: PlotBackend + ?Sized>(
    ds: &Dataset,
    settings: &Settings,
    unit: &UnitContext,
    backend: &mut B,
) -> Result<Vec<Plot>> {
    let cols = ds.columns();
    let passing = ds.passing();
    let pointer = settings.lengths_pointer;
    let lengths = ds.length_column(pointer);
    let mut plots = Vec::new();

    let n50 = settings.n50.then(|| stats::n50(&ds.lengths));
    plots.extend(backend.length_plots(
        unit,
        &ds.filtered_lengths(LengthColumn::Sequenced),
        n50,
    )?);
    info!("Created length plots");

    if cols.quals
        && let Some(quals) = ds.quals.as_deref()
    {
        plots.extend(backend.scatter(
            unit,
            &ScatterSpec {
                family: PlotFamily::LengthVsQuality,
                stem: "LengthvsQualityScatterPlot",
                x: gather(lengths, &passing, |v| v as f64),
                y: gather(quals, &passing, |v| v),
                names: ["Read lengths", "Average read quality"],
                log: settings.log_length,
                pearson: false,
                min_x: None,
                min_y: None,
            },
        )?);
        info!("Created LengthvsQual plot");
    }

    if cols.channel_ids
        && let Some(channels) = ds.channel_ids.as_deref()
    {
        plots.extend(backend.spatial_heatmap(unit, channels)?);
        info!("Created spatial heatmap for successful basecalls.");
    }

    if cols.start_time
        && let Some(start_time) = ds.start_time.as_deref()
    {
        let input = TimeSeriesInput {
            start_time,
            lengths: &ds.lengths,
            quals: ds.quals.as_deref().filter(|_| cols.quals),
            channels: ds.channel_ids.as_deref().filter(|_| cols.channel_ids),
            log_length: settings.log_length,
        };
        plots.extend(backend.time_plots(unit, &input)?);
        info!("Created timeplots.");
    }

    if cols.aligned_lengths
        && let Some(aligned) = ds.aligned_lengths.as_deref()
    {
        plots.extend(backend.scatter(
            unit,
            &ScatterSpec {
                family: PlotFamily::AlignedVsSequenced,
                stem: "AlignedReadlengthvsSequencedReadLength",
                x: gather(aligned, &passing, |v| v as f64),
                y: gather(&ds.lengths, &passing, |v| v as f64),
                names: ["Aligned read lengths", "Sequenced read length"],
                log: false,
                pearson: false,
                min_x: None,
                min_y: None,
            },
        )?);
        info!("Created AlignedLength vs Length plot.");
    }

    if cols.mapq
        && cols.quals
        && let (Some(mapq), Some(quals)) = (ds.mapq.as_deref(), ds.quals.as_deref())
    {
        plots.extend(backend.scatter(
            unit,
            &ScatterSpec {
                family: PlotFamily::MapqVsBaseQuality,
                stem: "MappingQualityvsAverageBaseQuality",
                x: mapq.iter().map(|&v| v as f64).collect(),
                y: quals.to_vec(),
                names: ["Read mapping quality", "Average basecall quality"],
                log: false,
                pearson: false,
                min_x: None,
                min_y: None,
            },
        )?);
        info!("Created MapQvsBaseQ plot.");
        plots.extend(backend.scatter(
            unit,
            &ScatterSpec {
                family: PlotFamily::LengthVsMapq,
                stem: "MappingQualityvsReadLength",
                x: gather(lengths, &passing, |v| v as f64),
                y: gather(mapq, &passing, |v| v as f64),
                names: ["Read length", "Read mapping quality"],
                log: settings.log_length,
                pearson: false,
                min_x: None,
                min_y: None,
            },
        )?);
        info!("Created Mapping quality vs read length plot.");
    }

    if cols.percent_identity
        && let Some(identity) = ds.percent_identity.as_deref()
    {
        let min_pid = stats::percentile(identity, 1.0);
        if cols.aligned_quals
            && let Some(aligned_quals) = ds.aligned_quals.as_deref()
        {
            plots.extend(backend.scatter(
                unit,
                &ScatterSpec {
                    family: PlotFamily::IdentityVsBaseQuality,
                    stem: "PercentIdentityvsAverageBaseQuality",
                    x: identity.to_vec(),
                    y: aligned_quals.to_vec(),
                    names: ["Percent identity", "Average Base Quality"],
                    log: false,
                    pearson: true,
                    min_x: Some(min_pid),
                    min_y: None,
                },
            )?);
            info!("Created Percent ID vs Base quality plot.");
        }
        plots.extend(backend.scatter(
            unit,
            &ScatterSpec {
                family: PlotFamily::LengthVsIdentity,
                stem: "PercentIdentityvsAlignedReadLength",
                x: gather(lengths, &passing, |v| v as f64),
                y: gather(identity, &passing, |v| v),
                names: ["Aligned read length", "Percent identity"],
                log: settings.log_length,
                pearson: true,
                min_x: None,
                min_y: Some(min_pid),
            },
        )?);
        info!("Created Percent ID vs Length plot");
    }

    for p in &plots {
        debug!("{}: {}", p.family.name(), p.path.display());
    }
    Ok(plots)
}

fn gather<T: Copy>(v: &[T], idx: &[usize], f: impl Fn(T) -> f64) -> Vec<f64> {
    idx.iter().map(|&i| f(v[i])).collect()
}
