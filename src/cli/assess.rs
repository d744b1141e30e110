//! CLI `assess` command.

use anyhow::Result;

use papersim::config::PapersimConfig;

/// Report how often each article's nearest neighbors share its subject.
pub fn assess(config: &PapersimConfig, topn: usize) -> Result<()> {
    let db = super::open_shared_db(config)?;
    let service = super::retrieval_service(config, &db, false, true)?;

    let mut progress = super::BatchProgress::default();
    let result = service.assess_subject_agreement_with_progress(topn, |done, total| progress.update(done, total));
    progress.finish();
    let report = result?;

    println!("Subject agreement (top {})", report.topn);
    println!("{}", "=".repeat(40));
    println!("  Articles assessed:   {}", report.seeds);
    if report.skipped > 0 {
        println!("  Skipped:             {}", report.skipped);
    }
    println!("  Neighbors compared:  {}", report.compared);
    println!("  Same-subject hits:   {}", report.hits);
    println!("  Accuracy:            {:.2}%", report.accuracy * 100.0);
    Ok(())
}
